//! Raw source records and the rows derived from them.
//!
//! The system of record pushes instances, holdings and items as JSON. Each
//! record becomes one primary row; instances and items also yield dictionary
//! rows (subjects, contributors, classifications, call numbers) and the
//! relationship rows linking them back to their instance.

use serde_json::{Map, Value};
use sha3::{Digest, Sha3_256};
use uuid::Uuid;

use crate::entity_type::ReindexEntityType;
use crate::error::RangeError;

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub shared: bool,
    pub is_bound_with: bool,
    pub json: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoldingRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub instance_id: Uuid,
    pub json: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub instance_id: Uuid,
    pub holding_id: Uuid,
    pub json: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRow {
    pub id: String,
    pub value: String,
    pub authority_id: Option<String>,
    pub source_id: Option<String>,
    pub type_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributorRow {
    pub id: String,
    pub name: String,
    pub name_type_id: Option<String>,
    pub authority_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRow {
    pub id: String,
    pub number: String,
    pub type_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallNumberRow {
    pub id: String,
    pub call_number: String,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub type_id: Option<String>,
}

/// Link between an instance and a dictionary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLinkRow {
    pub instance_id: Uuid,
    pub target_id: String,
    pub tenant_id: String,
    pub shared: bool,
    /// Contributor type for contributor links, empty otherwise.
    pub type_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceCallNumberRow {
    pub call_number_id: String,
    pub item_id: Uuid,
    pub instance_id: Uuid,
    pub location_id: Option<String>,
    pub tenant_id: String,
}

/// Primary rows parsed from one records event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub instances: Vec<InstanceRow>,
    pub holdings: Vec<HoldingRow>,
    pub items: Vec<ItemRow>,
}

/// Dictionary and relationship rows extracted from a [`RecordBatch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildRows {
    pub subjects: Vec<SubjectRow>,
    pub instance_subjects: Vec<InstanceLinkRow>,
    pub contributors: Vec<ContributorRow>,
    pub instance_contributors: Vec<InstanceLinkRow>,
    pub classifications: Vec<ClassificationRow>,
    pub instance_classifications: Vec<InstanceLinkRow>,
    pub call_numbers: Vec<CallNumberRow>,
    pub instance_call_numbers: Vec<InstanceCallNumberRow>,
}

impl ChildRows {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
            && self.contributors.is_empty()
            && self.classifications.is_empty()
            && self.call_numbers.is_empty()
    }
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.instances.len() + self.holdings.len() + self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extract dictionary and relationship rows from the instances and items.
    pub fn children(&self) -> ChildRows {
        let mut children = ChildRows::default();

        for instance in &self.instances {
            extract_instance_children(instance, &mut children);
        }
        for item in &self.items {
            extract_call_number(item, &mut children);
        }

        children
    }
}

/// Parse raw records of `entity_type` owned by `tenant_id`.
///
/// Instances may embed `holdings` and `items` arrays; those are split out
/// into their own rows and removed from the stored instance document.
pub fn parse_records(
    entity_type: ReindexEntityType,
    tenant_id: &str,
    records: &[Value],
) -> Result<RecordBatch, RangeError> {
    let mut batch = RecordBatch::default();

    for record in records {
        match entity_type {
            ReindexEntityType::Instance => parse_instance(record, tenant_id, &mut batch)?,
            ReindexEntityType::Holdings => {
                batch.holdings.push(parse_holding(record, tenant_id, None)?)
            }
            ReindexEntityType::Item => batch.items.push(parse_item(record, tenant_id, None)?),
            other => {
                return Err(RangeError::invalid_argument(format!(
                    "{} records are not pulled from the system of record",
                    other
                )))
            }
        }
    }

    Ok(batch)
}

fn parse_instance(record: &Value, tenant_id: &str, batch: &mut RecordBatch) -> Result<(), RangeError> {
    let id = required_uuid(record, "id")?;
    let mut json = as_object(record)?.clone();

    let embedded_holdings = json.remove("holdings");
    let embedded_items = json.remove("items");

    for holding in array_values(embedded_holdings.as_ref()) {
        batch.holdings.push(parse_holding(holding, tenant_id, Some(id))?);
    }
    for item in array_values(embedded_items.as_ref()) {
        batch.items.push(parse_item(item, tenant_id, Some(id))?);
    }

    batch.instances.push(InstanceRow {
        id,
        tenant_id: tenant_id.to_string(),
        shared: bool_field(&json, "shared"),
        is_bound_with: bool_field(&json, "isBoundWith"),
        json: Value::Object(json),
    });

    Ok(())
}

fn parse_holding(record: &Value, tenant_id: &str, parent: Option<Uuid>) -> Result<HoldingRow, RangeError> {
    Ok(HoldingRow {
        id: required_uuid(record, "id")?,
        tenant_id: tenant_id.to_string(),
        instance_id: uuid_or_parent(record, "instanceId", parent)?,
        json: record.clone(),
    })
}

fn parse_item(record: &Value, tenant_id: &str, parent: Option<Uuid>) -> Result<ItemRow, RangeError> {
    Ok(ItemRow {
        id: required_uuid(record, "id")?,
        tenant_id: tenant_id.to_string(),
        instance_id: uuid_or_parent(record, "instanceId", parent)?,
        holding_id: required_uuid(record, "holdingsRecordId")?,
        json: record.clone(),
    })
}

fn extract_instance_children(instance: &InstanceRow, children: &mut ChildRows) {
    let link = |target_id: String, type_id: String| InstanceLinkRow {
        instance_id: instance.id,
        target_id,
        tenant_id: instance.tenant_id.clone(),
        shared: instance.shared,
        type_id,
    };

    for subject in array_values(instance.json.get("subjects")) {
        let Some(value) = non_blank(subject, "value") else {
            continue;
        };
        let authority_id = non_blank(subject, "authorityId");
        let source_id = non_blank(subject, "sourceId");
        let type_id = non_blank(subject, "typeId");
        let id = hash_id(&[
            Some(value.as_str()),
            authority_id.as_deref(),
            source_id.as_deref(),
            type_id.as_deref(),
        ]);

        children.instance_subjects.push(link(id.clone(), String::new()));
        children.subjects.push(SubjectRow {
            id,
            value,
            authority_id,
            source_id,
            type_id,
        });
    }

    for contributor in array_values(instance.json.get("contributors")) {
        let Some(name) = non_blank(contributor, "name") else {
            continue;
        };
        let name_type_id = non_blank(contributor, "contributorNameTypeId");
        let authority_id = non_blank(contributor, "authorityId");
        let id = hash_id(&[
            Some(name.as_str()),
            name_type_id.as_deref(),
            authority_id.as_deref(),
        ]);
        let type_id = non_blank(contributor, "contributorTypeId").unwrap_or_default();

        children.instance_contributors.push(link(id.clone(), type_id));
        children.contributors.push(ContributorRow {
            id,
            name,
            name_type_id,
            authority_id,
        });
    }

    for classification in array_values(instance.json.get("classifications")) {
        let Some(number) = non_blank(classification, "classificationNumber") else {
            continue;
        };
        let type_id = non_blank(classification, "classificationTypeId");
        let id = hash_id(&[Some(number.as_str()), type_id.as_deref()]);

        children.instance_classifications.push(link(id.clone(), String::new()));
        children.classifications.push(ClassificationRow { id, number, type_id });
    }
}

fn extract_call_number(item: &ItemRow, children: &mut ChildRows) {
    let Some(components) = item.json.get("effectiveCallNumberComponents") else {
        return;
    };
    let Some(call_number) = non_blank(components, "callNumber") else {
        return;
    };
    let prefix = non_blank(components, "prefix");
    let suffix = non_blank(components, "suffix");
    let type_id = non_blank(components, "typeId");
    let id = hash_id(&[
        Some(call_number.as_str()),
        prefix.as_deref(),
        suffix.as_deref(),
        type_id.as_deref(),
    ]);

    children.instance_call_numbers.push(InstanceCallNumberRow {
        call_number_id: id.clone(),
        item_id: item.id,
        instance_id: item.instance_id,
        location_id: non_blank(&item.json, "effectiveLocationId"),
        tenant_id: item.tenant_id.clone(),
    });
    children.call_numbers.push(CallNumberRow {
        id,
        call_number,
        prefix,
        suffix,
        type_id,
    });
}

/// Lowercase hex SHA3-256 of the `|`-joined components; absent parts hash as empty.
pub fn hash_id(parts: &[Option<&str>]) -> String {
    let joined = parts
        .iter()
        .map(|part| part.unwrap_or("").trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|");
    hex::encode(Sha3_256::digest(joined.as_bytes()))
}

fn as_object(record: &Value) -> Result<&Map<String, Value>, RangeError> {
    record
        .as_object()
        .ok_or_else(|| RangeError::invalid_value("Record is not a JSON object"))
}

fn required_uuid(record: &Value, field: &str) -> Result<Uuid, RangeError> {
    let raw = record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RangeError::invalid_value(format!("Record is missing '{}'", field)))?;
    Uuid::parse_str(raw)
        .map_err(|e| RangeError::invalid_value(format!("Invalid {} '{}': {}", field, raw, e)))
}

fn uuid_or_parent(record: &Value, field: &str, parent: Option<Uuid>) -> Result<Uuid, RangeError> {
    match (record.get(field), parent) {
        (None, Some(parent)) => Ok(parent),
        _ => required_uuid(record, field),
    }
}

fn bool_field(json: &Map<String, Value>, field: &str) -> bool {
    json.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn non_blank(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn array_values(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .map(|values| values.iter())
        .into_iter()
        .flatten()
}
