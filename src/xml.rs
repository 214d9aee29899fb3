//! XML schema format.
//!
//! ```text
//! <schema version="1.0">
//!   <schema_settings read_in_memory="true" sort_by="CDH.OBT" frame_size="4000"
//!                    endian="big" include_frame_index="false"/>
//!   <subsystems>
//!     <subsystem name="PCS" offset="1604">
//!       <fields>
//!         <field name="vBatAverage" type="u16" offset="750">
//!           <calibration expr="raw * 0.01873128 + (-38.682956)" units="V" round="5"/>
//!         </field>
//!       </fields>
//!     </subsystem>
//!   </subsystems>
//! </schema>
//! ```
//!
//! `read_in_memory` and `include_frame_index` are required, `frame_size` defaults to 0 (and is
//! then rejected by [`crate::Schema::resolve`]), `endian` defaults to little. A `bytes` field
//! takes its length from the `bytes` attribute. Empty attributes count as absent.

use crate::ast::*;
use crate::error::SchemaError;
use crate::parser::{parse_bool, parse_integer};
use roxmltree::{Document, Node};

/// Parse an XML schema document into a [`SchemaDef`].
pub fn parse(source: &str) -> Result<SchemaDef, SchemaError> {
    let doc = Document::parse(source)?;
    let root = doc.root_element();
    if !root.has_tag_name("schema") {
        return Err(SchemaError::UnexpectedRoot(root.tag_name().name().to_string()));
    }

    let settings = child(root, "schema_settings")
        .ok_or(SchemaError::MissingElement("schema_settings"))
        .and_then(build_settings)?;

    let list = child(root, "subsystems").ok_or(SchemaError::MissingElement("subsystems"))?;
    let subsystems = children(list, "subsystem")
        .map(build_subsystem)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(subsystems = subsystems.len(), "parsed XML schema");
    Ok(SchemaDef {
        settings,
        subsystems,
    })
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn children<'a, 'i: 'a>(
    node: Node<'a, 'i>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children().filter(move |n| n.has_tag_name(name))
}

/// Attribute value, with empty or blank values treated as missing.
fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(
    node: Node<'a, '_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<&'a str, SchemaError> {
    attr(node, attribute).ok_or(SchemaError::MissingAttribute { element, attribute })
}

fn invalid(element: &'static str, attribute: &'static str, value: &str) -> SchemaError {
    SchemaError::InvalidAttribute {
        element,
        attribute,
        value: value.to_string(),
    }
}

fn integer(
    node: Node,
    element: &'static str,
    attribute: &'static str,
) -> Result<usize, SchemaError> {
    let value = required(node, element, attribute)?;
    parse_integer(value).ok_or_else(|| invalid(element, attribute, value))
}

fn endian(node: Node, element: &'static str) -> Result<Option<Endianness>, SchemaError> {
    attr(node, "endian")
        .map(|v| Endianness::from_name(v).ok_or_else(|| invalid(element, "endian", v)))
        .transpose()
}

fn build_settings(node: Node) -> Result<SettingsDef, SchemaError> {
    const ELEMENT: &str = "schema_settings";
    let flag = |key: &'static str| -> Result<bool, SchemaError> {
        let value = attr(node, key).ok_or(SchemaError::MissingSetting(key))?;
        parse_bool(value).ok_or_else(|| invalid(ELEMENT, key, value))
    };
    let read_in_memory = flag("read_in_memory")?;
    let include_frame_index = flag("include_frame_index")?;
    let frame_size = match attr(node, "frame_size") {
        Some(_) => integer(node, ELEMENT, "frame_size")?,
        None => 0,
    };
    Ok(SettingsDef {
        frame_size,
        endian: endian(node, ELEMENT)?.unwrap_or_default(),
        read_in_memory,
        sort_by: attr(node, "sort_by").map(str::to_string),
        include_frame_index,
    })
}

fn build_subsystem(node: Node) -> Result<SubsystemDef, SchemaError> {
    const ELEMENT: &str = "subsystem";
    let name = required(node, ELEMENT, "name")?.to_string();
    let offset = integer(node, ELEMENT, "offset")?;
    let list = child(node, "fields").ok_or(SchemaError::MissingElement("fields"))?;
    let fields = children(list, "field")
        .map(build_field)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SubsystemDef {
        name,
        offset,
        endian: endian(node, ELEMENT)?,
        fields,
    })
}

fn build_field(node: Node) -> Result<FieldDef, SchemaError> {
    const ELEMENT: &str = "field";
    let name = required(node, ELEMENT, "name")?.to_string();
    let type_name = required(node, ELEMENT, "type")?;
    let field_type = FieldType::from_name(type_name).ok_or_else(|| SchemaError::UnknownType {
        field: name.clone(),
        type_name: type_name.to_string(),
    })?;
    let length = match attr(node, "bytes") {
        Some(_) => Some(integer(node, ELEMENT, "bytes")?),
        None => None,
    };
    let calibration = match child(node, "calibration") {
        Some(cal) => build_calibration(&name, cal)?,
        None => None,
    };
    Ok(FieldDef {
        offset: integer(node, ELEMENT, "offset")?,
        field_type,
        length,
        endian: endian(node, ELEMENT)?,
        calibration,
        name,
    })
}

/// `None` when the element names neither an expression nor a function.
fn build_calibration(field: &str, node: Node) -> Result<Option<CalibrationDef>, SchemaError> {
    let expr = attr(node, "expr").map(str::to_string);
    let func = attr(node, "func").map(str::to_string);
    match (&expr, &func) {
        (None, None) => return Ok(None),
        (Some(_), Some(_)) => {
            return Err(SchemaError::CalibrationMethod {
                field: field.to_string(),
            })
        }
        _ => {}
    }
    let round = match attr(node, "round") {
        Some(value) => {
            let bad = || SchemaError::InvalidCalibration {
                field: field.to_string(),
                key: "round".to_string(),
                value: value.to_string(),
            };
            let digits = parse_integer(value).ok_or_else(bad)?;
            Some(u32::try_from(digits).map_err(|_| bad())?)
        }
        None => None,
    };
    Ok(Some(CalibrationDef {
        expr,
        func,
        round,
        units: attr(node, "units").map(str::to_string),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(attrs: &str) -> Result<SchemaDef, SchemaError> {
        parse(&format!(
            "<schema><schema_settings {}/><subsystems/></schema>",
            attrs
        ))
    }

    #[test]
    fn settings_defaults() {
        let def = settings(r#"read_in_memory="no" include_frame_index="YES""#).unwrap();
        assert_eq!(def.settings.frame_size, 0);
        assert_eq!(def.settings.endian, Endianness::Little);
        assert!(!def.settings.read_in_memory);
        assert!(def.settings.include_frame_index);
        assert!(def.subsystems.is_empty());
    }

    #[test]
    fn empty_attribute_counts_as_missing() {
        assert!(matches!(
            settings(r#"read_in_memory="" include_frame_index="0""#),
            Err(SchemaError::MissingSetting("read_in_memory"))
        ));
    }

    #[test]
    fn bad_endian_is_reported() {
        assert!(matches!(
            settings(r#"read_in_memory="1" include_frame_index="0" endian="middle""#),
            Err(SchemaError::InvalidAttribute {
                element: "schema_settings",
                attribute: "endian",
                ..
            })
        ));
    }

    #[test]
    fn malformed_xml_is_a_schema_error() {
        assert!(matches!(parse("<schema>"), Err(SchemaError::Xml(_))));
    }
}
