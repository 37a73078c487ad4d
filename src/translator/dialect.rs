//! Backend-specific rendering for the few constructs the translator emits
//! that are not portable: relative-time predicates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Postgres,
    Mysql,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Hour,
    Day,
    Month,
}

impl TimeUnit {
    pub fn parse(word: &str) -> Option<TimeUnit> {
        match word.to_lowercase().trim_end_matches('s') {
            "hour" => Some(TimeUnit::Hour),
            "day" => Some(TimeUnit::Day),
            "month" => Some(TimeUnit::Month),
            _ => None,
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Month => "month",
        }
    }
}

/// Recency window recognized in natural language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    Today,
    Yesterday,
    Last { amount: u32, unit: TimeUnit },
}

impl SqlDialect {
    /// Predicate restricting `column` to the window
    pub fn recency_predicate(&self, column: &str, window: &TimeWindow) -> String {
        match window {
            TimeWindow::Today => format!("{} >= {}", column, self.start_of_today()),
            TimeWindow::Yesterday => format!(
                "{col} >= {start} AND {col} < {today}",
                col = column,
                start = self.start_of_yesterday(),
                today = self.start_of_today()
            ),
            TimeWindow::Last { amount, unit } => {
                format!("{} >= {}", column, self.now_minus(*amount, *unit))
            }
        }
    }

    fn now_minus(&self, amount: u32, unit: TimeUnit) -> String {
        let plural = if amount == 1 { "" } else { "s" };
        match self {
            SqlDialect::Postgres => format!("NOW() - INTERVAL '{} {}{}'", amount, unit.singular(), plural),
            SqlDialect::Mysql => format!("NOW() - INTERVAL {} {}", amount, unit.singular().to_uppercase()),
            SqlDialect::Sqlite => format!("datetime('now', '-{} {}{}')", amount, unit.singular(), plural),
        }
    }

    fn start_of_today(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "CURRENT_DATE",
            SqlDialect::Mysql => "CURDATE()",
            SqlDialect::Sqlite => "date('now')",
        }
    }

    fn start_of_yesterday(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "CURRENT_DATE - INTERVAL '1 day'",
            SqlDialect::Mysql => "CURDATE() - INTERVAL 1 DAY",
            SqlDialect::Sqlite => "date('now', '-1 day')",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_days_per_dialect() {
        let window = TimeWindow::Last { amount: 7, unit: TimeUnit::Day };
        assert_eq!(
            SqlDialect::Postgres.recency_predicate("created_at", &window),
            "created_at >= NOW() - INTERVAL '7 days'"
        );
        assert_eq!(
            SqlDialect::Mysql.recency_predicate("created_at", &window),
            "created_at >= NOW() - INTERVAL 7 DAY"
        );
        assert_eq!(
            SqlDialect::Sqlite.recency_predicate("created_at", &window),
            "created_at >= datetime('now', '-7 days')"
        );
    }

    #[test]
    fn test_yesterday_is_bounded() {
        assert_eq!(
            SqlDialect::Postgres.recency_predicate("placed_at", &TimeWindow::Yesterday),
            "placed_at >= CURRENT_DATE - INTERVAL '1 day' AND placed_at < CURRENT_DATE"
        );
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!(TimeUnit::parse("Hours"), Some(TimeUnit::Hour));
        assert_eq!(TimeUnit::parse("month"), Some(TimeUnit::Month));
        assert_eq!(TimeUnit::parse("weeks"), None);
    }
}
