use super::{detach_property, VisitContext, VisitorStrategy};
use crate::core::{Result, Value};
use crate::detach::seen::Node;

/// Visitor for objects the store does not manage.
///
/// Such an object may still hold store values in any field, so every field
/// is inspected.
pub struct PlainObjectVisitor;

impl VisitorStrategy for PlainObjectVisitor {
    fn name(&self) -> &'static str {
        "plain-object"
    }

    fn can_visit(&self, node: &Node, _cx: &VisitContext<'_>) -> bool {
        matches!(node, Node::Object(_))
    }

    fn visit(&self, node: &Node, cx: &mut VisitContext<'_>) -> Result<Vec<Value>> {
        let Node::Object(object) = node else {
            return Ok(Vec::new());
        };

        let fields: Vec<(String, Value)> = object
            .read()
            .fields()
            .filter(|(_, value)| !value.is_scalar())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut children = Vec::new();
        for (name, value) in fields {
            if let Some(replacement) = detach_property(cx, object, &name, &value, None, &mut children)? {
                object.set_property(&name, replacement);
            }
        }
        Ok(children)
    }
}
