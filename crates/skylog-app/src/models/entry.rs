use serde::{Deserialize, Serialize};

/// Parsed output of one extraction call: the page classification plus every
/// logbook entry the model found on the slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default, rename = "pageType")]
    pub page_type: String,
    #[serde(default)]
    pub entries: Vec<ExtractedEntry>,
}

/// One transcribed logbook entry as emitted by the vision model.
///
/// Every field is optional on the wire; handwritten pages routinely omit
/// most of them. String fields default to empty rather than `None` so the
/// identity checks and persistence code can treat "absent" and "illegible"
/// uniformly, matching the extraction prompt's contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractedEntry {
    pub date: String,
    pub aircraft_registration: String,
    pub aircraft_serial: String,
    pub aircraft_make: String,
    pub aircraft_model: String,
    #[serde(deserialize_with = "flex::opt_f64")]
    pub hobbs_time: Option<f64>,
    #[serde(deserialize_with = "flex::opt_f64")]
    pub tach_time: Option<f64>,
    #[serde(deserialize_with = "flex::opt_f64")]
    pub flight_time: Option<f64>,
    #[serde(deserialize_with = "flex::opt_f64")]
    pub time_since_overhaul: Option<f64>,
    pub shop_name: String,
    pub shop_address: String,
    pub shop_phone: String,
    pub repair_station_number: String,
    pub mechanic_name: String,
    pub mechanic_certificate: String,
    pub work_order_number: String,
    pub maintenance_narrative: String,
    pub entry_type: String,
    pub inspection_type: String,
    pub far_reference: String,
    #[serde(deserialize_with = "flex::opt_f64")]
    pub confidence: Option<f64>,
    pub needs_review: bool,
    pub missing_data: Vec<String>,
    pub uncertain_fields: Vec<String>,
    pub extraction_notes: String,
    pub ad_compliance: Vec<AdComplianceRecord>,
    pub parts_actions: Vec<PartsActionRecord>,
}

/// An Airworthiness Directive compliance noted within an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdComplianceRecord {
    pub ad_number: String,
    pub method: String,
    pub notes: String,
}

/// A part installed/removed/replaced/etc. within an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartsActionRecord {
    pub action: String,
    pub part_name: String,
    pub part_number: String,
    pub serial_number: String,
    pub old_part_number: String,
    pub old_serial_number: String,
    #[serde(deserialize_with = "flex::opt_u32")]
    pub quantity: Option<u32>,
    pub notes: String,
}

/// Lenient numeric deserializers. Vision models emit `1234.5`, `"1234.5"`,
/// `"1,234.5"`, or `null` for the same column depending on the scan; anything
/// unparseable collapses to `None` rather than failing the whole slice.
mod flex {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        })
    }

    pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .or_else(|| n.as_f64().map(|f| f.max(0.0) as u32)),
            Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
            _ => None,
        })
    }
}
