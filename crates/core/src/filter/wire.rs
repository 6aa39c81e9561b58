//! JSON shape exchanged with the filter UI and the dynamic table:
//!
//! ```json
//! {"jointype": 2, "filters": {"roles": {"name": "roles", "jointype": 1, "values": [3, 5]}}}
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::FilterError;
use crate::filter::{FilterName, FilterSet, FilterSpec, FilterValue, JoinType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFilter {
    pub name: String,
    #[serde(default = "filter_default_join")]
    pub jointype: JoinType,
    #[serde(default)]
    pub values: Vec<FilterValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFilterSet {
    #[serde(default)]
    pub jointype: JoinType,
    #[serde(default)]
    pub filters: BTreeMap<String, WireFilter>,
}

fn filter_default_join() -> JoinType {
    JoinType::FILTER_DEFAULT
}

impl From<&FilterSpec> for WireFilter {
    fn from(spec: &FilterSpec) -> Self {
        Self {
            name: spec.name().as_str().to_owned(),
            jointype: spec.join_type(),
            values: spec.values().to_vec(),
        }
    }
}

impl From<&FilterSet> for WireFilterSet {
    fn from(set: &FilterSet) -> Self {
        Self {
            jointype: set.join_type(),
            filters: set
                .filters()
                .map(|spec| (spec.name().as_str().to_owned(), WireFilter::from(spec)))
                .collect(),
        }
    }
}

impl TryFrom<WireFilterSet> for FilterSet {
    type Error = FilterError;

    fn try_from(wire: WireFilterSet) -> Result<Self, Self::Error> {
        let mut set = FilterSet::new(wire.jointype);
        for (key, filter) in wire.filters {
            if key != filter.name {
                return Err(FilterError::NameMismatch {
                    key,
                    name: filter.name,
                });
            }
            let name: FilterName = filter.name.parse()?;
            set.add_filter(FilterSpec::new(name, filter.jointype, filter.values));
        }
        Ok(set)
    }
}

impl FilterSet {
    /// Decodes the wire JSON.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Malformed` for invalid JSON and the naming errors
    /// of `TryFrom<WireFilterSet>` otherwise. Schema validation is separate.
    pub fn from_json(raw: &str) -> Result<Self, FilterError> {
        let wire: WireFilterSet =
            serde_json::from_str(raw).map_err(|e| FilterError::Malformed(e.to_string()))?;
        Self::try_from(wire)
    }

    /// Encodes the set as wire JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A map of strings, integers and string values cannot fail to encode.
        serde_json::to_string(&WireFilterSet::from(self)).unwrap_or_default()
    }
}

impl Serialize for FilterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireFilterSet::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireFilterSet::deserialize(deserializer)?;
        FilterSet::try_from(wire).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockInstanceId, CourseId};

    #[test]
    fn round_trip_preserves_filters_and_value_order() {
        let set = FilterSet::for_block(CourseId::new(4), BlockInstanceId::new(11))
            .with_filter(FilterSpec::new(FilterName::Roles, JoinType::None, [5_i64, 3]))
            .with_filter(FilterSpec::new(
                FilterName::Groups,
                JoinType::All,
                [20_i64, 10, -1],
            ));
        let mut with_outer = set.clone();
        with_outer.set_join_type(JoinType::Any);

        let decoded = FilterSet::from_json(&with_outer.to_json()).unwrap();
        assert_eq!(decoded, with_outer);
        assert_eq!(
            decoded.filter(FilterName::Roles).unwrap().values(),
            &[FilterValue::Int(5), FilterValue::Int(3)]
        );
    }

    #[test]
    fn decodes_ui_payload_in_any_filter_order() {
        let raw = r#"{
            "jointype": 0,
            "filters": {
                "roles": {"name": "roles", "jointype": 1, "values": [3, "5"]},
                "courseid": {"name": "courseid", "jointype": 1, "values": [2]},
                "blockinstanceid": {"name": "blockinstanceid", "values": [8]}
            }
        }"#;
        let set = FilterSet::from_json(raw).unwrap();
        set.validate().unwrap();
        assert_eq!(set.join_type(), JoinType::None);
        let roles = set.filter(FilterName::Roles).unwrap();
        assert_eq!(roles.int_values().unwrap(), vec![3, 5]);
        assert_eq!(
            set.filter(FilterName::BlockInstanceId).unwrap().join_type(),
            JoinType::Any
        );
    }

    #[test]
    fn missing_outer_join_type_defaults_to_all() {
        let set = FilterSet::from_json(r#"{"filters": {}}"#).unwrap();
        assert_eq!(set.join_type(), JoinType::All);
    }

    #[test]
    fn unknown_filter_name_is_rejected() {
        let raw = r#"{"jointype": 2, "filters": {"status": {"name": "status", "values": [1]}}}"#;
        assert_eq!(
            FilterSet::from_json(raw).unwrap_err(),
            FilterError::UnknownFilter("status".into())
        );
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let raw = r#"{"filters": {"roles": {"name": "groups", "values": [1]}}}"#;
        assert!(matches!(
            FilterSet::from_json(raw).unwrap_err(),
            FilterError::NameMismatch { .. }
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            FilterSet::from_json("{").unwrap_err(),
            FilterError::Malformed(_)
        ));
    }
}
