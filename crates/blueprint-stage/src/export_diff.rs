//! Diffs a blueprint's `exports.*` block against the exports already
//! recorded in persisted state (spec §4.11). A field whose substitution is
//! unresolved at staging time is never marked removed; it is instead
//! deferred by recording its export name in `resolve_on_deploy`.

use std::collections::BTreeMap;

use blueprint_core::blueprint::ExportSpec;
use blueprint_core::mapping::MappingNode;
use blueprint_core::substitution::{SubstitutionContext, SubstitutionResolver};
use blueprint_core::Result;

#[derive(Debug, Clone, Default)]
pub struct ExportDiff {
    pub new_exports: BTreeMap<String, MappingNode>,
    pub export_changes: BTreeMap<String, MappingNode>,
    pub removed_exports: Vec<String>,
    pub unchanged_exports: Vec<String>,
    pub resolve_on_deploy: Vec<String>,
}

/// Diffs `exports` (the blueprint's declared export block) against `current`
/// (the instance's persisted export values, empty for a fresh instance).
pub async fn diff_exports(
    exports: &BTreeMap<String, ExportSpec>,
    current: &BTreeMap<String, MappingNode>,
    resolver: &dyn SubstitutionResolver,
    context: &SubstitutionContext,
) -> Result<ExportDiff> {
    let mut diff = ExportDiff::default();

    for (name, export) in exports {
        let resolved = resolver.resolve_tree(&export.field, context).await?;
        if !resolved.resolve_on_deploy.is_empty() {
            diff.resolve_on_deploy.push(name.clone());
            continue;
        }
        match current.get(name) {
            None => {
                diff.new_exports.insert(name.clone(), resolved.value);
            }
            Some(prior) if *prior == resolved.value => {
                diff.unchanged_exports.push(name.clone());
            }
            Some(_) => {
                diff.export_changes.insert(name.clone(), resolved.value);
            }
        }
    }

    for name in current.keys() {
        if !exports.contains_key(name) {
            diff.removed_exports.push(name.clone());
        }
    }

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blueprint_core::substitution::ResolutionOutcome;

    struct EchoResolver;
    #[async_trait]
    impl SubstitutionResolver for EchoResolver {
        async fn resolve(&self, expr: &MappingNode, _ctx: &SubstitutionContext) -> Result<ResolutionOutcome> {
            Ok(ResolutionOutcome::Resolved(expr.clone()))
        }
    }

    fn export(value: &str) -> ExportSpec {
        ExportSpec {
            field: MappingNode::String(value.to_string()),
            description: None,
        }
    }

    #[tokio::test]
    async fn classifies_new_changed_unchanged_and_removed() {
        let mut exports = BTreeMap::new();
        exports.insert("apiUrl".to_string(), export("https://new.example.com"));
        exports.insert("tableName".to_string(), export("orders"));

        let mut current = BTreeMap::new();
        current.insert("tableName".to_string(), MappingNode::String("orders".into()));
        current.insert("apiUrl".to_string(), MappingNode::String("https://old.example.com".into()));
        current.insert("legacyArn".to_string(), MappingNode::String("arn:aws:sqs:old".into()));

        let diff = diff_exports(&exports, &current, &EchoResolver, &SubstitutionContext::default())
            .await
            .unwrap();

        assert!(diff.export_changes.contains_key("apiUrl"));
        assert_eq!(diff.unchanged_exports, vec!["tableName".to_string()]);
        assert_eq!(diff.removed_exports, vec!["legacyArn".to_string()]);
        assert!(diff.new_exports.is_empty());
    }

    #[tokio::test]
    async fn new_export_with_no_prior_value() {
        let mut exports = BTreeMap::new();
        exports.insert("queueArn".to_string(), export("arn:aws:sqs:new"));
        let diff = diff_exports(&exports, &BTreeMap::new(), &EchoResolver, &SubstitutionContext::default())
            .await
            .unwrap();
        assert!(diff.new_exports.contains_key("queueArn"));
    }
}
