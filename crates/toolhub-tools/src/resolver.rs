//! Tool name conflict resolution
//!
//! Input order is significant: it is the priority order for `priority`,
//! the first-seen order for `merge`, and the scan order for `error`. The
//! output never depends on hash iteration order.

use std::collections::BTreeMap;

use toolhub_config::{ConflictStrategy, Repository};
use tracing::{debug, info, Span};

use crate::{
    error::ToolError,
    models::{McpTool, ResolvedTool, ToolConflict, ToolsSpecification},
    resources, Result,
};

/// Tools and conflict records produced by one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub tools: Vec<ResolvedTool>,
    pub conflicts: Vec<ToolConflict>,
}

/// Where one tool definition came from
#[derive(Debug, Clone, Copy)]
struct Source {
    repo: usize,
    tool: usize,
}

#[derive(Debug, Clone)]
pub struct ToolResolver {
    strategy: ConflictStrategy,
    span: Span,
}

impl ToolResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Resolve the tools of several repositories into one collision-free set
    pub fn resolve(&self, specs: &[(Repository, ToolsSpecification)]) -> Result<Resolution> {
        let occurrences = collect_occurrences(specs);
        let labels = source_labels(specs);

        let resolution = match self.strategy {
            ConflictStrategy::Error => resolve_error(specs, &occurrences, &labels)?,
            ConflictStrategy::Prefix => resolve_prefix(specs, &occurrences, &labels),
            ConflictStrategy::Priority => resolve_priority(specs, &occurrences, &labels),
            ConflictStrategy::Merge => resolve_merge(specs, &occurrences, &labels),
        };

        for conflict in &resolution.conflicts {
            debug!(
                parent: &self.span,
                tool = %conflict.name,
                repositories = ?conflict.repositories,
                resolution = %conflict.resolution,
                "Resolved tool conflict"
            );
        }
        info!(
            parent: &self.span,
            strategy = %self.strategy,
            tools = resolution.tools.len(),
            conflicts = resolution.conflicts.len(),
            "Tool resolution completed"
        );
        Ok(resolution)
    }
}

/// Tool names in first-seen order, each with every source defining it
fn collect_occurrences(specs: &[(Repository, ToolsSpecification)]) -> Vec<(String, Vec<Source>)> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut occurrences: Vec<(String, Vec<Source>)> = Vec::new();

    for (repo, (_, spec)) in specs.iter().enumerate() {
        for (tool, definition) in spec.tools.iter().enumerate() {
            let source = Source { repo, tool };
            match index.get(definition.name.as_str()) {
                Some(&slot) => occurrences[slot].1.push(source),
                None => {
                    index.insert(definition.name.as_str(), occurrences.len());
                    occurrences.push((definition.name.clone(), vec![source]));
                }
            }
        }
    }
    occurrences
}

/// Name each input repository uniquely
///
/// The last url segment is used unless another input shares it, then the
/// full url, then `url@branch` when the url itself is shared.
fn source_labels(specs: &[(Repository, ToolsSpecification)]) -> Vec<String> {
    let count = |f: &dyn Fn(&Repository) -> bool| specs.iter().filter(|(r, _)| f(r)).count();

    specs
        .iter()
        .map(|(repo, _)| {
            if count(&|r: &Repository| r.short_name() == repo.short_name()) == 1 {
                repo.short_name().to_string()
            } else if count(&|r: &Repository| r.url == repo.url) == 1 {
                repo.url.clone()
            } else {
                repo.to_string()
            }
        })
        .collect()
}

fn tool_at<'a>(specs: &'a [(Repository, ToolsSpecification)], source: Source) -> (&'a Repository, &'a McpTool) {
    let (repo, spec) = &specs[source.repo];
    (repo, &spec.tools[source.tool])
}

fn resolved(repo: &Repository, tool: &McpTool, resolved_name: String) -> ResolvedTool {
    ResolvedTool {
        original_name: tool.name.clone(),
        resolved_name,
        repository: repo.url.clone(),
        branch: repo.branch.clone(),
        resource_uris: tool
            .resources
            .iter()
            .map(|path| resources::encode(&repo.url, &repo.branch, path))
            .collect(),
        specification: tool.clone(),
    }
}

fn conflict_labels(sources: &[Source], labels: &[String]) -> Vec<String> {
    sources.iter().map(|s| labels[s.repo].clone()).collect()
}

/// Every definition in input order: repository by repository, tool by tool
fn all_sources(specs: &[(Repository, ToolsSpecification)]) -> impl Iterator<Item = Source> + '_ {
    specs
        .iter()
        .enumerate()
        .flat_map(|(repo, (_, spec))| (0..spec.tools.len()).map(move |tool| Source { repo, tool }))
}

fn resolve_error(
    specs: &[(Repository, ToolsSpecification)],
    occurrences: &[(String, Vec<Source>)],
    labels: &[String],
) -> Result<Resolution> {
    if let Some((name, sources)) = occurrences.iter().find(|(_, sources)| sources.len() > 1) {
        return Err(ToolError::Conflict {
            name: name.clone(),
            repositories: conflict_labels(sources, labels),
        });
    }

    let tools = all_sources(specs)
        .map(|source| {
            let (repo, tool) = tool_at(specs, source);
            resolved(repo, tool, tool.name.clone())
        })
        .collect();
    Ok(Resolution {
        tools,
        conflicts: Vec::new(),
    })
}

fn resolve_prefix(
    specs: &[(Repository, ToolsSpecification)],
    occurrences: &[(String, Vec<Source>)],
    labels: &[String],
) -> Resolution {
    let prefixed = |source: Source, name: &str| format!("{}:{}", labels[source.repo], name);

    let tools = all_sources(specs)
        .map(|source| {
            let (repo, tool) = tool_at(specs, source);
            resolved(repo, tool, prefixed(source, &tool.name))
        })
        .collect();

    let conflicts = occurrences
        .iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(name, sources)| ToolConflict {
            name: name.clone(),
            repositories: conflict_labels(sources, labels),
            strategy_applied: ConflictStrategy::Prefix,
            resolution: format!(
                "Prefixed as {}",
                sources
                    .iter()
                    .map(|s| prefixed(*s, name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
        .collect();

    Resolution { tools, conflicts }
}

fn resolve_priority(
    specs: &[(Repository, ToolsSpecification)],
    occurrences: &[(String, Vec<Source>)],
    labels: &[String],
) -> Resolution {
    let winners: Vec<Source> = occurrences.iter().map(|(_, sources)| sources[0]).collect();
    let is_winner = |s: &Source| winners.iter().any(|w| w.repo == s.repo && w.tool == s.tool);

    let tools = all_sources(specs)
        .filter(is_winner)
        .map(|source| {
            let (repo, tool) = tool_at(specs, source);
            resolved(repo, tool, tool.name.clone())
        })
        .collect();

    let conflicts = occurrences
        .iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(name, sources)| ToolConflict {
            name: name.clone(),
            repositories: conflict_labels(sources, labels),
            strategy_applied: ConflictStrategy::Priority,
            resolution: format!("Kept definition from {}", labels[sources[0].repo]),
        })
        .collect();

    Resolution { tools, conflicts }
}

fn resolve_merge(
    specs: &[(Repository, ToolsSpecification)],
    occurrences: &[(String, Vec<Source>)],
    labels: &[String],
) -> Resolution {
    let by_first: BTreeMap<(usize, usize), &Vec<Source>> = occurrences
        .iter()
        .map(|(_, sources)| ((sources[0].repo, sources[0].tool), sources))
        .collect();

    let tools = all_sources(specs)
        .filter_map(|source| by_first.get(&(source.repo, source.tool)).map(|all| (source, *all)))
        .map(|(first, all)| {
            let (repo, tool) = tool_at(specs, first);
            if all.len() == 1 {
                return resolved(repo, tool, tool.name.clone());
            }

            let mut specification = tool.clone();
            specification.resources.clear();
            let mut resource_uris = Vec::new();
            for source in all {
                let (contributor, definition) = tool_at(specs, *source);
                for path in &definition.resources {
                    if !specification.resources.contains(path) {
                        specification.resources.push(path.clone());
                        resource_uris.push(resources::encode(&contributor.url, &contributor.branch, path));
                    }
                }
            }

            ResolvedTool {
                original_name: tool.name.clone(),
                resolved_name: tool.name.clone(),
                repository: repo.url.clone(),
                branch: repo.branch.clone(),
                specification,
                resource_uris,
            }
        })
        .collect();

    let conflicts = occurrences
        .iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(name, sources)| {
            let repositories = conflict_labels(sources, labels);
            ToolConflict {
                name: name.clone(),
                resolution: format!("Merged definitions from {}", repositories.join(", ")),
                repositories,
                strategy_applied: ConflictStrategy::Merge,
            }
        })
        .collect();

    Resolution { tools, conflicts }
}
