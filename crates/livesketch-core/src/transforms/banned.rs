use super::{HANDLE, LOOP_COUNT, LOOP_PROTECT, LOOP_SET_TIMEOUT};
use crate::ast::{Expression, Identifier};
use crate::errors::SketchError;
use crate::walker::{Ancestor, NodeMut, Visitor};

const FRESH_BANNED: &[&str] = &[HANDLE, LOOP_COUNT, LOOP_PROTECT, LOOP_SET_TIMEOUT];
// Captured source legitimately carries the guard names.
const PATCH_BANNED: &[&str] = &[HANDLE];

/// Rejects identifiers reserved for sandbox internals, in any position.
pub struct BannedIdentifiers {
    names: &'static [&'static str],
}

impl BannedIdentifiers {
    pub fn fresh() -> Self {
        Self {
            names: FRESH_BANNED,
        }
    }

    pub fn patch() -> Self {
        Self {
            names: PATCH_BANNED,
        }
    }

    fn check(&self, id: &Identifier) -> Result<(), SketchError> {
        if self.names.contains(&id.name.as_str()) {
            return Err(SketchError::BannedIdentifier {
                name: id.name.clone(),
                line: id.loc.line.saturating_sub(1),
            });
        }
        Ok(())
    }
}

impl Visitor for BannedIdentifiers {
    fn enter(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<(), SketchError> {
        match node {
            NodeMut::Expression(Expression::Identifier(id)) | NodeMut::Identifier(id, _) => {
                self.check(id)
            }
            _ => Ok(()),
        }
    }
}
