use crate::error::{FlagSourceError, FlagStage, ParseError};
use crate::field::extract_field;
use crate::model::FlagAssignment;
use crate::term::{parse_term, Term};

const OUTER_FIELD: &str = "configFlags";
const INNER_FIELD: &str = "configConfigurationsFlags";

/// The flag assignment the package was configured with.
///
/// The assignment lives in `configConfigurationsFlags` inside the `configFlags` record. Flag names
/// may be shown bare, as string literals, or wrapped in `FlagName "..."`. A flag listed twice keeps
/// its first position and its last value.
pub fn resolve_flags(blob: &str) -> Result<FlagAssignment, ParseError> {
    let outer = extract_field(blob, OUTER_FIELD).map_err(|e| fail(FlagStage::OuterField, e))?;
    let inner = extract_field(outer, INNER_FIELD).map_err(|e| fail(FlagStage::InnerField, e))?;
    let term = parse_term(inner).map_err(|e| fail(FlagStage::Assignment, e))?;
    let flags = assignment(&term).map_err(|e| fail(FlagStage::Assignment, e))?;
    tracing::debug!(target: "cradle.cabal", flags = flags.len(), "read flag assignment");
    Ok(flags)
}

fn fail(stage: FlagStage, source: impl Into<FlagSourceError>) -> ParseError {
    ParseError::Flags {
        stage,
        source: source.into(),
    }
}

fn assignment(term: &Term) -> Result<FlagAssignment, FlagSourceError> {
    let entries = term.as_list().ok_or_else(|| {
        FlagSourceError::Shape(format!("expected a list of pairs, found {}", term.describe()))
    })?;
    let mut out = FlagAssignment::with_capacity(entries.len());
    for entry in entries {
        let Some([name, value]) = entry.as_tuple() else {
            return Err(FlagSourceError::Shape(format!(
                "expected (flag, value) pairs, found {}",
                entry.describe()
            )));
        };
        let name = flag_name(name).ok_or_else(|| {
            FlagSourceError::Shape(format!("unrecognized flag name `{name}`"))
        })?;
        let value = value.as_bool().ok_or_else(|| {
            FlagSourceError::Shape(format!("flag `{name}` has non-boolean value `{value}`"))
        })?;
        out.insert(name, value);
    }
    Ok(out)
}

fn flag_name(term: &Term) -> Option<String> {
    match term {
        Term::Str(name) => Some(name.clone()),
        Term::App { head, args } if args.is_empty() => Some(head.clone()),
        Term::App { head, args } if head == "FlagName" || head == "mkFlagName" => match &args[..] {
            [Term::Str(name)] => Some(name.clone()),
            _ => None,
        },
        _ => None,
    }
}
