//! Strict coercion of chat arguments to declared parameter kinds.

use std::sync::Arc;

use cmdbridge_common::Error;
use cmdbridge_common::models::{ArgValue, ChatUser, CommandDeclaration, ParamKind};

fn coerce_one(literal: &str, kind: ParamKind) -> Option<ArgValue> {
    match kind {
        ParamKind::Int => literal.parse::<i64>().ok().map(ArgValue::Int),
        ParamKind::Float => literal
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(ArgValue::Float),
        ParamKind::Bool => {
            if literal.eq_ignore_ascii_case("true") {
                Some(ArgValue::Bool(true))
            } else if literal.eq_ignore_ascii_case("false") {
                Some(ArgValue::Bool(false))
            } else {
                None
            }
        }
        ParamKind::String => Some(ArgValue::Text(literal.to_string())),
        // never matched against chat text
        ParamKind::User => None,
    }
}

/// Builds the full argument list for `decl`: the sender first when the
/// declaration asks for it, then one coerced value per chat argument.
pub fn bind_arguments(
    decl: &CommandDeclaration,
    user: &Arc<ChatUser>,
    args: &[&str],
) -> Result<Vec<ArgValue>, Error> {
    let expected = decl.text_params();
    if args.len() != expected.len() {
        return Err(Error::ArgumentCount {
            command: decl.name.clone(),
            expected: expected.len(),
            actual: args.len(),
        });
    }

    let mut values = Vec::with_capacity(decl.params.len());
    if decl.takes_user() {
        values.push(ArgValue::User(Arc::clone(user)));
    }

    for (index, (literal, kind)) in args.iter().zip(expected).enumerate() {
        match coerce_one(literal, *kind) {
            Some(v) => values.push(v),
            None => {
                return Err(Error::ArgumentType {
                    command: decl.name.clone(),
                    index,
                    literal: literal.to_string(),
                    expected: *kind,
                });
            }
        }
    }

    Ok(values)
}
