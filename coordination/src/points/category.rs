//! Shared classification enums and per-variant weight tables.

use serde::{Deserialize, Serialize};

/// Category of a consensus or divergence point, declared in importance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Core,
    Strategic,
    Tactical,
    Technical,
    Procedural,
    Auxiliary,
}

impl Category {
    /// All categories, most important first.
    pub const ALL: [Category; 6] = [
        Self::Core,
        Self::Strategic,
        Self::Tactical,
        Self::Technical,
        Self::Procedural,
        Self::Auxiliary,
    ];

    /// Parse a snake_case category name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "core" => Some(Self::Core),
            "strategic" => Some(Self::Strategic),
            "tactical" => Some(Self::Tactical),
            "technical" => Some(Self::Technical),
            "procedural" => Some(Self::Procedural),
            "auxiliary" => Some(Self::Auxiliary),
            _ => None,
        }
    }

    /// Whether this is one of the two top-level categories.
    pub fn is_high_level(self) -> bool {
        matches!(self, Self::Core | Self::Strategic)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Strategic => write!(f, "strategic"),
            Self::Tactical => write!(f, "tactical"),
            Self::Technical => write!(f, "technical"),
            Self::Procedural => write!(f, "procedural"),
            Self::Auxiliary => write!(f, "auxiliary"),
        }
    }
}

/// Priority of a consensus point. `Critical` ranks 1, `Low` ranks 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank (1 = most urgent).
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Severity of a disagreement. Ordered so that `Low < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity implied by a count of opposing position pairs.
    pub fn from_opposing_pairs(pairs: usize) -> Self {
        match pairs {
            0 => Self::Low,
            1 => Self::Medium,
            2 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn is_high_or_worse(self) -> bool {
        self >= Self::High
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One float per [`Category`]. Used for decay rates, type weights and
/// hierarchy weights so every table is overridable from config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub core: f64,
    pub strategic: f64,
    pub tactical: f64,
    pub technical: f64,
    pub procedural: f64,
    pub auxiliary: f64,
}

impl CategoryWeights {
    /// Build a table; arguments follow [`Category::ALL`] order.
    pub const fn new(
        core: f64,
        strategic: f64,
        tactical: f64,
        technical: f64,
        procedural: f64,
        auxiliary: f64,
    ) -> Self {
        Self {
            core,
            strategic,
            tactical,
            technical,
            procedural,
            auxiliary,
        }
    }

    /// A table with the same value everywhere.
    pub const fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value, value, value)
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Core => self.core,
            Category::Strategic => self.strategic,
            Category::Tactical => self.tactical,
            Category::Technical => self.technical,
            Category::Procedural => self.procedural,
            Category::Auxiliary => self.auxiliary,
        }
    }

    /// Element-wise product of two tables.
    pub fn scaled_by(&self, other: &CategoryWeights) -> CategoryWeights {
        CategoryWeights::new(
            self.core * other.core,
            self.strategic * other.strategic,
            self.tactical * other.tactical,
            self.technical * other.technical,
            self.procedural * other.procedural,
            self.auxiliary * other.auxiliary,
        )
    }
}

/// One float per [`Severity`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl SeverityWeights {
    pub const fn new(critical: f64, high: f64, medium: f64, low: f64) -> Self {
        Self {
            critical,
            high,
            medium,
            low,
        }
    }

    pub fn get(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// One float per [`Priority`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl PriorityWeights {
    pub const fn new(critical: f64, high: f64, medium: f64, low: f64) -> Self {
        Self {
            critical,
            high,
            medium,
            low,
        }
    }

    pub fn get(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Clamp to `[0, 1]`, mapping NaN to zero.
pub(crate) fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_order_and_display() {
        assert!(Category::Core < Category::Auxiliary);
        assert_eq!(Category::Technical.to_string(), "technical");
        assert_eq!(Category::parse(" Strategic "), Some(Category::Strategic));
        assert_eq!(Category::parse("unknown"), None);
    }

    #[test]
    fn test_severity_from_pairs() {
        assert_eq!(Severity::from_opposing_pairs(0), Severity::Low);
        assert_eq!(Severity::from_opposing_pairs(1), Severity::Medium);
        assert_eq!(Severity::from_opposing_pairs(2), Severity::High);
        assert_eq!(Severity::from_opposing_pairs(7), Severity::Critical);
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn test_category_weights_lookup() {
        let table = CategoryWeights::new(1.0, 0.85, 0.65, 0.75, 0.5, 0.4);
        assert_eq!(table.get(Category::Tactical), 0.65);
        assert_eq!(table.get(Category::Technical), 0.75);
        let doubled = table.scaled_by(&CategoryWeights::uniform(2.0));
        assert_eq!(doubled.get(Category::Core), 2.0);
    }

    #[test]
    fn test_unit_clamps_nan() {
        assert_eq!(unit(f64::NAN), 0.0);
        assert_eq!(unit(1.7), 1.0);
        assert_eq!(unit(-0.2), 0.0);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(back, Severity::High);
    }
}
