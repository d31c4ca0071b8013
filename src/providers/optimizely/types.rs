use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Numeric Optimizely entity identifier.
pub type EntityId = u64;

/// One record from the change-history endpoint.
///
/// Every field is optional on the wire: change history also covers pages,
/// audiences and events, and those entries carry different shapes. A field
/// with an unexpected type decodes as `None` instead of failing the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(default, deserialize_with = "lenient")]
    pub entity: Option<ChangedEntity>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub changes: Option<Vec<FieldChange>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangedEntity {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<EntityId>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

/// A single property change inside a [`ChangeEvent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(default, deserialize_with = "lenient")]
    pub property: Option<String>,
    #[serde(default)]
    pub after: Option<Value>,
}

/// Experiment as returned by `GET /experiments/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentDetail {
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Serialized condition expression, e.g. `["and", {"audience_id": 123}]`
    #[serde(default)]
    pub audience_conditions: Option<String>,
    #[serde(default)]
    pub page_ids: Vec<EntityId>,
    #[serde(default)]
    pub variations: Vec<Variant>,
    /// Shared code applied to every variation
    #[serde(default)]
    pub changes: Vec<CodeChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Variant {
    /// Traffic share in basis points out of the total allocation
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub actions: Vec<VariantAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantAction {
    #[serde(default)]
    pub changes: Vec<CodeChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeChange {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Usually the code payload; non-code changes carry objects here
    #[serde(default)]
    pub value: Option<Value>,
}

impl CodeChange {
    pub const CUSTOM_CODE: &'static str = "custom_code";

    pub fn is_custom_code(&self) -> bool {
        self.kind.as_deref() == Some(Self::CUSTOM_CODE)
    }

    pub fn code(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Keeps the entries of an array that decode; anything but an array is `None`.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

/// Page as returned by `GET /pages/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageDetail {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub conditions: Option<String>,
}
