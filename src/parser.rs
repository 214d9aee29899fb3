//! Parse schema and plugin source into definitions using PEST.

use crate::ast::*;
use crate::error::SchemaError;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

const TRUE_STRINGS: [&str; 3] = ["true", "yes", "1"];
const FALSE_STRINGS: [&str; 3] = ["false", "no", "0"];

/// Parse schema source into a [`SchemaDef`]. Structural validation happens in
/// [`crate::Schema::resolve`].
pub fn parse(source: &str) -> Result<SchemaDef, SchemaError> {
    let pairs = SchemaParser::parse(Rule::schema, source)
        .map_err(|e| SchemaError::Syntax(e.to_string()))?;
    let pair = pairs
        .into_iter()
        .next()
        .ok_or_else(|| SchemaError::Syntax("empty schema".to_string()))?;
    build_schema(pair)
}

/// Parse plugin source into `(name, expression text)` pairs in declaration order.
pub fn parse_plugin(source: &str) -> Result<Vec<(String, String)>, SchemaError> {
    let pairs = SchemaParser::parse(Rule::plugin, source)
        .map_err(|e| SchemaError::Syntax(e.to_string()))?;
    let mut defs = Vec::new();
    for pair in pairs.flatten() {
        if pair.as_rule() != Rule::plugin_def {
            continue;
        }
        let mut inner = pair.into_inner();
        let name = next_str(&mut inner, "plugin definition: name")?;
        let expr = next_str(&mut inner, "plugin definition: expression")?;
        defs.push((name.to_string(), expr.trim().to_string()));
    }
    Ok(defs)
}

fn next_str<'i>(
    pairs: &mut pest::iterators::Pairs<'i, Rule>,
    what: &str,
) -> Result<&'i str, SchemaError> {
    pairs
        .next()
        .map(|p| p.as_str())
        .ok_or_else(|| SchemaError::Syntax(format!("{}: missing", what)))
}

fn build_schema(pair: Pair<Rule>) -> Result<SchemaDef, SchemaError> {
    let mut settings = None;
    let mut subsystems = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::settings_section => settings = Some(build_settings(inner)?),
            Rule::subsystem_section => subsystems.push(build_subsystem(inner)?),
            _ => {}
        }
    }
    Ok(SchemaDef {
        settings: settings.ok_or(SchemaError::MissingSetting("settings"))?,
        subsystems,
    })
}

fn build_settings(pair: Pair<Rule>) -> Result<SettingsDef, SchemaError> {
    let mut frame_size = None;
    let mut endian = Endianness::default();
    let mut read_in_memory = false;
    let mut sort_by = None;
    let mut include_frame_index = false;

    for setting in pair.into_inner() {
        let mut it = setting.into_inner();
        let key = next_str(&mut it, "setting: key")?;
        let value = next_str(&mut it, "setting: value")?;
        let invalid = || SchemaError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "frame_size" => frame_size = Some(parse_integer(value).ok_or_else(invalid)?),
            "endian" => endian = Endianness::from_name(value).ok_or_else(invalid)?,
            "read_in_memory" => read_in_memory = parse_bool(value).ok_or_else(invalid)?,
            "include_frame_index" => {
                include_frame_index = parse_bool(value).ok_or_else(invalid)?
            }
            "sort_by" => sort_by = Some(value.to_string()),
            _ => return Err(invalid()),
        }
    }

    Ok(SettingsDef {
        frame_size: frame_size.ok_or(SchemaError::MissingSetting("frame_size"))?,
        endian,
        read_in_memory,
        sort_by,
        include_frame_index,
    })
}

fn build_subsystem(pair: Pair<Rule>) -> Result<SubsystemDef, SchemaError> {
    let mut name = String::new();
    let mut offset = 0;
    let mut endian = None;
    let mut fields = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::integer => offset = integer_value(&inner)?,
            Rule::endian => endian = Endianness::from_name(inner.as_str()),
            Rule::field => fields.push(build_field(inner)?),
            _ => {}
        }
    }
    Ok(SubsystemDef {
        name,
        offset,
        endian,
        fields,
    })
}

fn build_field(pair: Pair<Rule>) -> Result<FieldDef, SchemaError> {
    let mut name = String::new();
    let mut type_spec = None;
    let mut offset = 0;
    let mut endian = None;
    let mut calibration = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::field_type => type_spec = Some(inner),
            Rule::integer => offset = integer_value(&inner)?,
            Rule::endian => endian = Endianness::from_name(inner.as_str()),
            Rule::calibration => calibration = Some(build_calibration(&name, inner)?),
            _ => {}
        }
    }
    let type_pair = type_spec.ok_or_else(|| SchemaError::Syntax(format!("field {}: missing type", name)))?;
    let (field_type, length) = build_field_type(&name, type_pair)?;
    Ok(FieldDef {
        name,
        field_type,
        offset,
        length,
        endian,
        calibration,
    })
}

fn build_field_type(
    field: &str,
    pair: Pair<Rule>,
) -> Result<(FieldType, Option<usize>), SchemaError> {
    let mut type_name = "";
    let mut length = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => type_name = inner.as_str(),
            Rule::integer => length = Some(integer_value(&inner)?),
            _ => {}
        }
    }
    let field_type = FieldType::from_name(type_name).ok_or_else(|| SchemaError::UnknownType {
        field: field.to_string(),
        type_name: type_name.to_string(),
    })?;
    Ok((field_type, length))
}

fn build_calibration(field: &str, pair: Pair<Rule>) -> Result<CalibrationDef, SchemaError> {
    let mut def = CalibrationDef::default();
    for entry in pair.into_inner() {
        let mut it = entry.into_inner();
        let key = next_str(&mut it, "calibration: key")?;
        let value_pair = it
            .next()
            .ok_or_else(|| SchemaError::Syntax(format!("field {}: calibration {}: missing value", field, key)))?;
        let value = match value_pair.as_rule() {
            Rule::string => value_pair
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or(""),
            _ => value_pair.as_str(),
        };
        let invalid = || SchemaError::InvalidCalibration {
            field: field.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "expr" => def.expr = Some(value.to_string()),
            "func" => def.func = Some(value.to_string()),
            "units" => def.units = Some(value.to_string()),
            "round" => {
                let digits = parse_integer(value).ok_or_else(invalid)?;
                def.round = Some(u32::try_from(digits).map_err(|_| invalid())?);
            }
            _ => return Err(invalid()),
        }
    }
    Ok(def)
}

fn integer_value(pair: &Pair<Rule>) -> Result<usize, SchemaError> {
    parse_integer(pair.as_str())
        .ok_or_else(|| SchemaError::Syntax(format!("integer out of range: {}", pair.as_str())))
}

pub(crate) fn parse_integer(s: &str) -> Option<usize> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    let lower = s.to_ascii_lowercase();
    if TRUE_STRINGS.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_STRINGS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_spellings() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn hex_integers() {
        assert_eq!(parse_integer("0x10"), Some(16));
        assert_eq!(parse_integer("42"), Some(42));
    }
}
