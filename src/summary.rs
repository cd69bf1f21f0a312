use serde::{Deserialize, Serialize};

use crate::scope::ScopeFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardColor {
    Blue,
    Purple,
    Green,
    Orange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCard {
    pub title: String,
    pub value: u64,
    pub icon: String,
    pub trend: Option<Trend>,
    pub description: String,
    pub color: CardColor,
}

pub fn summary_cards(
    member_count: u64,
    appreciation_count: u64,
    filter: &ScopeFilter,
) -> Vec<SummaryCard> {
    let appreciation_description = if filter.is_unrestricted() {
        "Total appreciation posts in the system".to_string()
    } else {
        format!("Appreciation posts in {}", filter.label())
    };

    vec![
        SummaryCard {
            title: "Team Members".to_string(),
            value: member_count,
            icon: "users".to_string(),
            trend: None,
            description: "Total number of team members".to_string(),
            color: CardColor::Blue,
        },
        SummaryCard {
            title: "Appreciation Posts".to_string(),
            value: appreciation_count,
            icon: "award".to_string(),
            trend: None,
            description: appreciation_description,
            color: CardColor::Purple,
        },
    ]
}
