//! Material descriptions come back either as JSON or as an fdm_material XML
//! document depending on firmware.

use serde_json::Value;

use super::Payload;

pub const UNKNOWN_MATERIAL: &str = "Unknown";

const MATERIAL_NAMESPACE: &str = "http://www.ultimaker.com/material";

/// Extract the display name from a material description, if it has one.
pub fn material_name(payload: &Payload) -> Option<String> {
    match payload {
        Payload::Json(Value::Object(fields)) => fields
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        Payload::Json(Value::String(xml)) | Payload::Text(xml) => name_from_xml(xml),
        Payload::Json(_) => None,
    }
}

fn name_from_xml(xml: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(xml).ok()?;
    let element = doc.descendants().find(|node| {
        node.is_element()
            && node.tag_name().name() == "material"
            && node.tag_name().namespace() == Some(MATERIAL_NAMESPACE)
    })?;

    let text = element.text()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
