use crate::{ItemId, Properties, Result, Transaction};

/// Read access to the item a split is evaluated in
pub trait RoutingScope {
    /// Item property stored under `Property/<name>`.
    fn item_property(&self, name: &str) -> Result<Option<String>>;
}

/// Everything a routing evaluator needs to decide the branches of a split
pub struct RoutingRequest<'a> {
    pub item: ItemId,
    pub split_name: &'a str,
    pub split_path: &'a str,
    pub properties: &'a Properties,
    pub scope: &'a dyn RoutingScope,
    pub txn: Transaction,
}

/// Decides which outgoing aliases of an Or/XOr/Loop split are enabled.
pub trait RoutingEvaluator: Send + Sync {
    /// Comma separated list of enabled aliases. Whitespace around aliases is ignored.
    fn evaluate(&self, request: &RoutingRequest<'_>) -> Result<String>;
}

/// Splits a routing result into trimmed, non-empty aliases.
pub fn parse_aliases(result: &str) -> Vec<String> {
    result
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_trimmed() {
        assert_eq!(parse_aliases(" 1, 2 ,,3"), vec!["1", "2", "3"]);
        assert!(parse_aliases("").is_empty());
    }
}
