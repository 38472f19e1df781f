use super::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;

/// System fields a filter or projection may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    PartitionKey,
    RowKey,
    Timestamp,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::PartitionKey => "PartitionKey",
            Field::RowKey => "RowKey",
            Field::Timestamp => "Timestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparison {
    fn operator(&self) -> &'static str {
        match self {
            Comparison::Equal => "eq",
            Comparison::NotEqual => "ne",
            Comparison::LessThan => "lt",
            Comparison::LessThanOrEqual => "le",
            Comparison::GreaterThan => "gt",
            Comparison::GreaterThanOrEqual => "ge",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            Comparison::LessThan => ordering == Ordering::Less,
            Comparison::LessThanOrEqual => ordering != Ordering::Greater,
            Comparison::GreaterThan => ordering == Ordering::Greater,
            Comparison::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Instant(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: Field,
    pub comparison: Comparison,
    pub value: FilterValue,
}

impl Condition {
    pub fn text(field: Field, comparison: Comparison, value: impl Into<String>) -> Self {
        Self {
            field,
            comparison,
            value: FilterValue::Text(value.into()),
        }
    }

    pub fn instant(field: Field, comparison: Comparison, value: DateTime<Utc>) -> Self {
        Self {
            field,
            comparison,
            value: FilterValue::Instant(value),
        }
    }

    /// A record lacking the field, or holding a value of another kind, never matches.
    pub fn matches(&self, record: &Record) -> bool {
        let ordering = match (&self.field, &self.value) {
            (Field::PartitionKey, FilterValue::Text(v)) => {
                Some(record.partition_key.as_str().cmp(v.as_str()))
            }
            (Field::RowKey, FilterValue::Text(v)) => {
                record.row_key.as_deref().map(|rk| rk.cmp(v.as_str()))
            }
            (Field::Timestamp, FilterValue::Instant(v)) => record.timestamp.map(|ts| ts.cmp(v)),
            _ => None,
        };

        ordering.is_some_and(|o| self.comparison.holds(o))
    }

    fn to_odata(&self) -> String {
        let value = match &self.value {
            FilterValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            FilterValue::Instant(v) => format!(
                "datetime'{}'",
                v.to_rfc3339_opts(SecondsFormat::Micros, true)
            ),
        };
        format!(
            "{} {} {}",
            self.field.as_str(),
            self.comparison.operator(),
            value
        )
    }
}

/// A conjunction of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Renders the filter as an OData `$filter` expression.
    pub fn to_odata(&self) -> String {
        if let [single] = self.conditions.as_slice() {
            return single.to_odata();
        }
        self.conditions
            .iter()
            .map(|c| format!("({})", c.to_odata()))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

/// Which fields a scan returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<Field>),
}

impl Projection {
    pub fn columns(fields: impl IntoIterator<Item = Field>) -> Self {
        Projection::Columns(fields.into_iter().collect())
    }

    pub fn includes(&self, field: Field) -> bool {
        match self {
            Projection::All => true,
            Projection::Columns(fields) => fields.contains(&field),
        }
    }

    /// Applies the projection to a full record.
    pub fn apply(&self, record: &Record) -> Record {
        match self {
            Projection::All => record.clone(),
            Projection::Columns(_) => Record {
                partition_key: record.partition_key.clone(),
                row_key: record
                    .row_key
                    .clone()
                    .filter(|_| self.includes(Field::RowKey)),
                timestamp: record.timestamp.filter(|_| self.includes(Field::Timestamp)),
                properties: serde_json::Map::new(),
            },
        }
    }

    /// Renders the projection as an OData `$select` list, `None` for all fields.
    pub fn to_select(&self) -> Option<String> {
        match self {
            Projection::All => None,
            Projection::Columns(fields) => Some(
                fields
                    .iter()
                    .map(Field::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}
