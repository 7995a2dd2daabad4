//! Expands every templated resource (one carrying an `each` substitution)
//! into an ordered sequence of indexed resource instances, propagating
//! labels and link selectors across linked templates (spec §4.1).
//!
//! Expansion is schema-to-schema: the input [`BlueprintSpec`] is never
//! mutated, only a new, fully-expanded one is produced, so every later
//! staging pass only ever sees expanded resource names.

use std::collections::BTreeMap;

use blueprint_core::blueprint::{BlueprintSpec, ResourceSpec};
use blueprint_core::mapping::MappingNode;
use blueprint_core::substitution::{ResolutionOutcome, SubstitutionContext, SubstitutionResolver};
use blueprint_core::{Error, Result};

/// Output of template expansion: the new schema plus a map from each
/// template's logical name to the ordered list of names it expanded into.
#[derive(Debug, Clone)]
pub struct ExpansionResult {
    pub blueprint: BlueprintSpec,
    pub template_expansions: BTreeMap<String, Vec<String>>,
}

/// Expands every `each`-carrying resource in `blueprint` using `resolver` to
/// produce the ordered item sequence for each template (spec §4.1).
pub async fn expand_templates(
    blueprint: &BlueprintSpec,
    resolver: &dyn SubstitutionResolver,
    context: &SubstitutionContext,
) -> Result<ExpansionResult> {
    let template_names: Vec<String> = blueprint
        .template_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    if template_names.is_empty() {
        return Ok(ExpansionResult {
            blueprint: blueprint.clone(),
            template_expansions: BTreeMap::new(),
        });
    }

    let mut each_items: BTreeMap<String, Vec<MappingNode>> = BTreeMap::new();
    for name in &template_names {
        let resource = &blueprint.resources[name];
        let each_expr = resource
            .each
            .as_ref()
            .expect("template_names only yields resources with `each` set");
        let items = match resolver.resolve(each_expr, context).await? {
            ResolutionOutcome::Resolved(MappingNode::Array(items)) => items,
            ResolutionOutcome::Resolved(other) => vec![other],
            ResolutionOutcome::DeferredUntilDeploy => {
                return Err(Error::Internal(format!(
                    "template '{name}' has an `each` expression that cannot be resolved at staging time"
                )));
            }
        };
        each_items.insert(name.clone(), items);
    }

    let mut shared_labels: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut indexed_labels: BTreeMap<String, Vec<BTreeMap<String, String>>> = template_names
        .iter()
        .map(|n| (n.clone(), vec![BTreeMap::new(); each_items[n].len()]))
        .collect();
    let mut shared_selectors: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut indexed_selectors: BTreeMap<String, Vec<BTreeMap<String, String>>> = template_names
        .iter()
        .map(|n| (n.clone(), vec![BTreeMap::new(); each_items[n].len()]))
        .collect();

    // Classify edges: `source` selects `target` when source's link selector
    // matches every label it names on target.
    for (source_name, source) in &blueprint.resources {
        if source.link_selector.by_label.is_empty() {
            continue;
        }
        for (target_name, target) in &blueprint.resources {
            if source_name == target_name {
                continue;
            }
            let selects = source
                .link_selector
                .by_label
                .iter()
                .all(|(k, v)| target.metadata.labels.get(k) == Some(v));
            if !selects {
                continue;
            }

            // `target` is an in-edge recipient (selected by `source`).
            if let Some(target_len_items) = each_items.get(target_name) {
                classify_edge(
                    source_name,
                    source,
                    target_name,
                    target_len_items.len(),
                    &template_names,
                    &each_items,
                    &mut indexed_labels,
                    &mut shared_labels,
                )?;
            }

            // `source` is an out-edge originator (it selects `target`); its
            // own link selector gets the symmetric per-index treatment when
            // `source` is itself a template linked to a same-length target.
            if template_names.contains(source_name) && template_names.contains(target_name) {
                let source_len = each_items[source_name].len();
                let target_len = each_items[target_name].len();
                if source_len != target_len {
                    return Err(Error::ResourceTemplateLinkLengthMismatch {
                        template_a: source_name.clone(),
                        len_a: source_len,
                        template_b: target_name.clone(),
                        len_b: target_len,
                    });
                }
                let entry = indexed_selectors.get_mut(source_name).unwrap();
                for (i, slot) in entry.iter_mut().enumerate() {
                    for (k, v) in &source.link_selector.by_label {
                        slot.insert(format!("{k}_{i}"), v.clone());
                    }
                }
            } else {
                shared_selectors
                    .entry(source_name.clone())
                    .or_default()
                    .extend(source.link_selector.by_label.clone());
            }
        }
    }

    let mut expanded = blueprint.clone();
    let mut template_expansions = BTreeMap::new();

    for name in &template_names {
        let template = blueprint.resources[name].clone();
        expanded.resources.remove(name);
        let items = &each_items[name];
        let mut names = Vec::with_capacity(items.len());

        for i in 0..items.len() {
            let expanded_name = format!("{name}_{i}");
            let mut labels = template.metadata.labels.clone();
            labels.extend(shared_labels.get(name).cloned().unwrap_or_default());
            labels.extend(indexed_labels[name][i].clone());

            let mut selectors = if shared_selectors.contains_key(name) || indexed_selectors[name].iter().any(|m| !m.is_empty()) {
                shared_selectors.get(name).cloned().unwrap_or_default()
            } else {
                template.link_selector.by_label.clone()
            };
            selectors.extend(indexed_selectors[name][i].clone());

            let resource = ResourceSpec {
                resource_type: template.resource_type.clone(),
                each: None,
                condition: template.condition.clone(),
                depends_on: template.depends_on.clone(),
                link_selector: blueprint_core::blueprint::LinkSelector { by_label: selectors },
                metadata: blueprint_core::blueprint::ResourceMetadata { labels },
                spec: template.spec.clone(),
            };
            expanded.resources.insert(expanded_name.clone(), resource);
            names.push(expanded_name);
        }
        template_expansions.insert(name.clone(), names);
    }

    Ok(ExpansionResult {
        blueprint: expanded,
        template_expansions,
    })
}

#[allow(clippy::too_many_arguments)]
fn classify_edge(
    source_name: &str,
    source: &ResourceSpec,
    target_name: &str,
    target_len: usize,
    template_names: &[String],
    each_items: &BTreeMap<String, Vec<MappingNode>>,
    indexed_labels: &mut BTreeMap<String, Vec<BTreeMap<String, String>>>,
    shared_labels: &mut BTreeMap<String, BTreeMap<String, String>>,
) -> Result<()> {
    if !template_names.contains(&target_name.to_string()) {
        return Ok(());
    }
    if template_names.contains(&source_name.to_string()) {
        let source_len = each_items[source_name].len();
        if source_len != target_len {
            return Err(Error::ResourceTemplateLinkLengthMismatch {
                template_a: source_name.to_string(),
                len_a: source_len,
                template_b: target_name.to_string(),
                len_b: target_len,
            });
        }
        let entry = indexed_labels.get_mut(target_name).unwrap();
        for (i, slot) in entry.iter_mut().enumerate() {
            for (k, v) in &source.link_selector.by_label {
                slot.insert(format!("{k}_{i}"), v.clone());
            }
        }
    } else {
        shared_labels
            .entry(target_name.to_string())
            .or_default()
            .extend(source.link_selector.by_label.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blueprint_core::blueprint::{LinkSelector, ResourceMetadata};
    use std::collections::BTreeMap as Map;

    struct StaticResolver;

    #[async_trait]
    impl SubstitutionResolver for StaticResolver {
        async fn resolve(
            &self,
            expr: &MappingNode,
            _context: &SubstitutionContext,
        ) -> Result<ResolutionOutcome> {
            Ok(ResolutionOutcome::Resolved(expr.clone()))
        }
    }

    fn bare_resource(resource_type: &str) -> ResourceSpec {
        ResourceSpec {
            resource_type: resource_type.to_string(),
            each: None,
            condition: None,
            depends_on: vec![],
            link_selector: LinkSelector::default(),
            metadata: ResourceMetadata::default(),
            spec: MappingNode::Object(Map::new()),
        }
    }

    #[tokio::test]
    async fn expands_template_into_indexed_resources() {
        let mut blueprint = BlueprintSpec::default();
        let mut template = bare_resource("aws/lambda/function");
        template.each = Some(MappingNode::Array(vec![
            MappingNode::String("a".into()),
            MappingNode::String("b".into()),
            MappingNode::String("c".into()),
        ]));
        blueprint.resources.insert("worker".to_string(), template);

        let result = expand_templates(&blueprint, &StaticResolver, &SubstitutionContext::default())
            .await
            .unwrap();

        assert_eq!(
            result.template_expansions.get("worker").unwrap(),
            &vec!["worker_0".to_string(), "worker_1".to_string(), "worker_2".to_string()]
        );
        assert!(result.blueprint.resources.contains_key("worker_0"));
        assert!(!result.blueprint.resources.contains_key("worker"));
    }

    #[tokio::test]
    async fn mismatched_template_lengths_error() {
        let mut blueprint = BlueprintSpec::default();

        let mut producer = bare_resource("queue");
        producer.each = Some(MappingNode::Array(vec![MappingNode::Int(0), MappingNode::Int(1)]));
        producer.metadata.labels.insert("role".into(), "producer".into());
        blueprint.resources.insert("producer".to_string(), producer);

        let mut consumer = bare_resource("worker");
        consumer.each = Some(MappingNode::Array(vec![MappingNode::Int(0)]));
        consumer
            .link_selector
            .by_label
            .insert("role".into(), "producer".into());
        blueprint.resources.insert("consumer".to_string(), consumer);

        let err = expand_templates(&blueprint, &StaticResolver, &SubstitutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceTemplateLinkLengthMismatch { .. }));
    }

    #[tokio::test]
    async fn non_template_blueprint_is_unchanged() {
        let mut blueprint = BlueprintSpec::default();
        blueprint
            .resources
            .insert("plain".to_string(), bare_resource("aws/s3/bucket"));
        let result = expand_templates(&blueprint, &StaticResolver, &SubstitutionContext::default())
            .await
            .unwrap();
        assert!(result.template_expansions.is_empty());
        assert_eq!(result.blueprint.resources.len(), 1);
    }
}
