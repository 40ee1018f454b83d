use crate::update::Update;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct UpdateRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "File")]
    file: String,
}

/// One row per occurrence, in collection order
pub struct UpdateTable {
    rows: Vec<UpdateRow>,
}

impl UpdateTable {
    pub fn new(updates: &[Update]) -> Self {
        let rows = updates
            .iter()
            .map(|update| UpdateRow {
                package: update.name.clone(),
                from: update.version.from.clone().unwrap_or_else(|| "-".to_string()),
                to: update.version.to.clone(),
                file: update.target().display().to_string(),
            })
            .collect();
        Self { rows }
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    if stats.is_empty() {
        return String::new();
    }
    let rows: Vec<StatRow> = stats
        .iter()
        .map(|(metric, value)| StatRow {
            metric: metric.to_string(),
            value: value.clone(),
        })
        .collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}
