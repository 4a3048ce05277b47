use lifecore::{BuiltInProperty, KernelError, Result, RoutingEvaluator, RoutingRequest};

const PROPERTY_PREFIX: &str = "property//";
const ACTIVITY_PREFIX: &str = "activity//";

/// Routing without a script engine.
///
/// A `RoutingExpr` is either a literal alias list, `property//<Name>` to read
/// an item property, or `activity//<Prop>` to read a property of the split.
/// Routing scripts are refused.
#[derive(Debug, Default, Clone)]
pub struct ExpressionRouting;

impl ExpressionRouting {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingEvaluator for ExpressionRouting {
    fn evaluate(&self, request: &RoutingRequest<'_>) -> Result<String> {
        let Some(expr) = request.properties.builtin_string(BuiltInProperty::RoutingExpr) else {
            let script = request
                .properties
                .builtin_string(BuiltInProperty::RoutingScriptName)
                .unwrap_or_default();
            return Err(KernelError::invalid(format!(
                "Split {} uses routing script '{}' but no script engine is installed",
                request.split_path, script
            )));
        };

        let result = if let Some(name) = expr.strip_prefix(PROPERTY_PREFIX) {
            request.scope.item_property(name)?.ok_or_else(|| {
                KernelError::invalid(format!(
                    "Routing of {} reads item property '{}', which is not set",
                    request.split_path, name
                ))
            })?
        } else if let Some(name) = expr.strip_prefix(ACTIVITY_PREFIX) {
            request.properties.string(name).ok_or_else(|| {
                KernelError::invalid(format!(
                    "Routing of {} reads property '{}' of {}, which is not set",
                    request.split_path, name, request.split_name
                ))
            })?
        } else {
            expr
        };

        tracing::debug!(item = %request.item, split = %request.split_path, "routing evaluated to '{}'", result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecore::{ItemId, Properties, RoutingScope, Transaction};

    struct Props(Vec<(&'static str, &'static str)>);

    impl RoutingScope for Props {
        fn item_property(&self, name: &str) -> Result<Option<String>> {
            Ok(self.0.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string()))
        }
    }

    fn evaluate(props: &Properties, scope: &Props) -> Result<String> {
        ExpressionRouting::new().evaluate(&RoutingRequest {
            item: ItemId::new(),
            split_name: "Route",
            split_path: "workflow/domain/Route",
            properties: props,
            scope,
            txn: Transaction(1),
        })
    }

    #[test]
    fn literal_item_property_and_split_property() {
        let scope = Props(vec![("Decision", "2")]);
        let mut props = Properties::new();

        props.set_builtin(BuiltInProperty::RoutingExpr, "1,3");
        assert_eq!(evaluate(&props, &scope).unwrap(), "1,3");

        props.set_builtin(BuiltInProperty::RoutingExpr, "property//Decision");
        assert_eq!(evaluate(&props, &scope).unwrap(), "2");

        props.insert("Branch", "4");
        props.set_builtin(BuiltInProperty::RoutingExpr, "activity//Branch");
        assert_eq!(evaluate(&props, &scope).unwrap(), "4");
    }

    #[test]
    fn missing_property_and_scripts_are_invalid() {
        let scope = Props(vec![]);
        let mut props = Properties::new();
        props.set_builtin(BuiltInProperty::RoutingExpr, "property//Decision");
        assert!(matches!(evaluate(&props, &scope), Err(KernelError::InvalidData(_))));

        let mut props = Properties::new();
        props.set_builtin(BuiltInProperty::RoutingScriptName, "ChooseBranch");
        assert!(matches!(evaluate(&props, &scope), Err(KernelError::InvalidData(_))));
    }
}
