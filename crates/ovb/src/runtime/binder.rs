//! Converts a caller's raw argument list into bound parameter storage.
//! Binding is deterministic and leaves the caller's arguments untouched
//! beyond the aliasing that by-reference passing is supposed to create.

use ovb_core::error::codes;
use ovb_core::{ArgumentError, ParamDecl, ParamMode, RuntimeError, TypeTag};

use super::values::{cast, new_slot, Slot, Value};

/// A caller-supplied argument. `ByRef` shares the caller's storage cell, so
/// mutations inside the callee are visible to the caller afterwards.
#[derive(Clone)]
pub enum Arg {
    ByVal(Value),
    ByRef(Slot),
}

impl Arg {
    fn value(&self) -> Value {
        match self {
            Arg::ByVal(value) => value.clone(),
            Arg::ByRef(slot) => slot.lock().clone(),
        }
    }
}

fn types_match(param: &ParamDecl, value: &Value) -> bool {
    match param.tag {
        TypeTag::Variant => true,
        TypeTag::Object => value.is_object(),
        tag => value.runtime_tag() == tag,
    }
}

/// Binds one parameter list against positionally-ordered arguments (`None`
/// marks an omitted position). Returns one storage cell per parameter.
pub fn bind_arguments(
    params: &[ParamDecl],
    args: Vec<Option<Arg>>,
) -> Result<Vec<Slot>, ArgumentError> {
    let has_param_array = params.last().map(|p| p.param_array).unwrap_or(false);
    if args.len() > params.len() && !has_param_array {
        return Err(ArgumentError::new(
            params.len(),
            RuntimeError::new(codes::WRONG_NUMBER_OF_ARGUMENTS),
        ));
    }

    let mut bound = Vec::with_capacity(params.len());
    let mut args = args.into_iter().enumerate();

    for (position, param) in params.iter().enumerate() {
        if param.param_array {
            let mut items = Vec::new();
            for (index, arg) in args.by_ref() {
                let arg = arg.ok_or_else(|| {
                    ArgumentError::new(index, RuntimeError::new(codes::ARGUMENT_NOT_OPTIONAL))
                })?;
                // A ParamArray only ever holds variants.
                let item = cast(&arg.value(), TypeTag::Variant)
                    .map_err(|cause| ArgumentError::new(index, cause))?;
                items.push(item);
            }
            let cell = if items.is_empty() {
                Value::missing()
            } else {
                Value::array(items)
            };
            bound.push(new_slot(cell));
            break;
        }

        match args.next() {
            Some((_, Some(arg))) => {
                let value = arg.value();
                if types_match(param, &value) {
                    match (&arg, param.mode) {
                        (Arg::ByRef(slot), ParamMode::ByRef) => bound.push(slot.clone()),
                        _ => {
                            // The fresh cell carries the parameter's declared
                            // type, not the argument's; a Variant parameter
                            // stays retypeable inside the callee.
                            let mut value = value;
                            value.declared = param.tag;
                            bound.push(new_slot(value));
                        }
                    }
                } else {
                    let converted = cast(&value, param.tag)
                        .map_err(|cause| ArgumentError::new(position, cause))?;
                    bound.push(new_slot(converted));
                }
            }
            Some((_, None)) | None => {
                if !param.optional {
                    return Err(ArgumentError::new(
                        position,
                        RuntimeError::new(codes::ARGUMENT_NOT_OPTIONAL),
                    ));
                }
                let cell = match &param.default {
                    Some(literal) => {
                        let value = Value::from_literal(literal);
                        cast(&value, param.tag)
                            .map_err(|cause| ArgumentError::new(position, cause))?
                    }
                    None => Value::missing(),
                };
                bound.push(new_slot(cell));
            }
        }
    }

    Ok(bound)
}

/// Reorders a mixed positional/named argument list into positional slots.
/// Once any argument is supplied by name, every later argument must be
/// named too; each name must resolve to a parameter at or after the first
/// named position, exactly once.
pub fn reorder_named<T>(
    params: &[ParamDecl],
    args: Vec<(Option<String>, T)>,
) -> Result<Vec<Option<T>>, RuntimeError> {
    let first_named = args.iter().position(|(name, _)| name.is_some());
    let Some(first_named) = first_named else {
        return Ok(args.into_iter().map(|(_, value)| Some(value)).collect());
    };

    let mut slots: Vec<Option<T>> = Vec::new();
    slots.resize_with(params.len().max(args.len()), || None);

    for (index, (name, value)) in args.into_iter().enumerate() {
        match name {
            None => {
                if index > first_named {
                    return Err(RuntimeError::with_message(
                        codes::NAMED_ARGUMENT_NOT_FOUND,
                        "positional argument after named argument",
                    ));
                }
                slots[index] = Some(value);
            }
            Some(name) => {
                let resolved = params
                    .iter()
                    .position(|param| param.name.eq_ignore_ascii_case(&name))
                    .ok_or_else(|| named_not_found(&name))?;
                if resolved < first_named || slots[resolved].is_some() {
                    return Err(named_not_found(&name));
                }
                slots[resolved] = Some(value);
            }
        }
    }

    Ok(slots)
}

fn named_not_found(name: &str) -> RuntimeError {
    RuntimeError::with_message(
        codes::NAMED_ARGUMENT_NOT_FOUND,
        format!("named argument not found: {name}"),
    )
}
