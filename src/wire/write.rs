use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{invalid_argument, BridgeResult};
use crate::model::FieldPath;
use crate::store::datastore::WriteOperation;
use crate::store::write::{
    encode_set_data, encode_update_data, validate_document_path, SetOptions,
};
use crate::wire::value::decode_fields;

/// Kind of a single remote write command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Set,
    Update,
    Delete,
}

/// One structurally validated write command from the remote caller.
///
/// The payload stays in wire form; values are translated when the command is
/// applied, so translation errors surface from the operation that consumes
/// the command rather than the one that delivered it.
#[derive(Clone, Debug)]
pub struct WriteCommand {
    kind: CommandKind,
    path: String,
    data: Option<JsonValue>,
    options: Option<JsonValue>,
}

impl WriteCommand {
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Deserialize)]
struct RawWriteCommand {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    data: Option<JsonValue>,
    #[serde(default)]
    options: Option<JsonValue>,
}

/// Parses an ordered list of write commands, validating structure only.
pub fn decode_commands(raw: &JsonValue) -> BridgeResult<Vec<WriteCommand>> {
    let raw_commands: Vec<RawWriteCommand> = serde_json::from_value(raw.clone())
        .map_err(|err| invalid_argument(format!("Malformed write commands: {err}")))?;

    let mut commands = Vec::with_capacity(raw_commands.len());
    for raw_command in raw_commands {
        let kind = match raw_command.kind.as_str() {
            "SET" => CommandKind::Set,
            "UPDATE" => CommandKind::Update,
            "DELETE" => CommandKind::Delete,
            other => {
                return Err(invalid_argument(format!(
                    "Unknown write command type '{other}'"
                )))
            }
        };
        validate_document_path(&raw_command.path)?;
        commands.push(WriteCommand {
            kind,
            path: raw_command.path,
            data: raw_command.data,
            options: raw_command.options,
        });
    }
    Ok(commands)
}

/// Decodes wire write options.
///
/// Exactly one of the merge flag and the field mask is forwarded; supplying
/// both, or neither, falls back to overwrite semantics without erroring.
pub fn decode_set_options(raw: Option<&JsonValue>) -> BridgeResult<SetOptions> {
    let map = match raw {
        None | Some(JsonValue::Null) => return Ok(SetOptions::overwrite()),
        Some(JsonValue::Object(map)) => map,
        Some(_) => return Err(invalid_argument("Write options must be an object")),
    };

    let merge = match map.get("merge") {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(flag)) => *flag,
        Some(_) => return Err(invalid_argument("Write option 'merge' must be a boolean")),
    };

    let merge_fields = match map.get("mergeFields") {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::Array(entries)) if entries.is_empty() => None,
        Some(JsonValue::Array(entries)) => {
            let mut fields = Vec::with_capacity(entries.len());
            for entry in entries {
                let path = entry.as_str().ok_or_else(|| {
                    invalid_argument("Write option 'mergeFields' must contain strings")
                })?;
                fields.push(FieldPath::from_dot_separated(path)?);
            }
            Some(fields)
        }
        Some(_) => {
            return Err(invalid_argument(
                "Write option 'mergeFields' must be an array",
            ))
        }
    };

    match (merge, merge_fields) {
        (true, Some(_)) => Ok(SetOptions::overwrite()),
        (true, None) => Ok(SetOptions::merge_all()),
        (false, Some(fields)) => SetOptions::merge_fields(fields),
        (false, None) => Ok(SetOptions::overwrite()),
    }
}

/// Translates a command into an engine write, converting its data.
pub fn command_to_write(command: &WriteCommand) -> BridgeResult<WriteOperation> {
    let key = validate_document_path(&command.path)?;
    match command.kind {
        CommandKind::Set => {
            let data = command
                .data
                .as_ref()
                .ok_or_else(|| invalid_argument("SET commands require data"))?;
            let fields = decode_fields(data)?;
            let options = decode_set_options(command.options.as_ref())?;
            let encoded = encode_set_data(fields, &options)?;
            Ok(WriteOperation::Set {
                key,
                data: encoded.map,
                mask: encoded.mask,
                transforms: encoded.transforms,
            })
        }
        CommandKind::Update => {
            let data = command
                .data
                .as_ref()
                .ok_or_else(|| invalid_argument("UPDATE commands require data"))?;
            let fields = decode_fields(data)?;
            let encoded = encode_update_data(fields)?;
            Ok(WriteOperation::Update {
                key,
                data: encoded.map,
                field_paths: encoded.field_paths,
                transforms: encoded.transforms,
            })
        }
        CommandKind::Delete => Ok(WriteOperation::Delete { key }),
    }
}

/// Decodes a batch payload into engine writes, preserving submitted order.
pub fn decode_batch(raw: &JsonValue) -> BridgeResult<Vec<WriteOperation>> {
    decode_commands(raw)?
        .iter()
        .map(command_to_write)
        .collect()
}
