//! cross-node references
//!
//! A value like `pre-${/Other:key}-post` is stored verbatim while parsing, the target may not exist yet. Once the
//! whole document is in the tree every recorded [Reference] is resolved in the order it was found.
//!
//! Resolution is a single pass. A placeholder whose target is itself a reference only sees the final value if that
//! other reference came earlier in the list.
use crate::tree::Properties;

/// Placeholder `${target_hierarchy:target_property}` in property `source_property` of node `location`
///
/// Nodes are kept by path and looked up again when resolving.
#[derive(derive_new::new, Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub location: String,
    pub source_property: String,
    pub target_hierarchy: String,
    pub target_property: String,
}

impl Reference {
    /// Matches the placeholder text, spaces around `:` are tolerated
    ///
    /// Path and key go into the pattern as they are.
    fn pattern(&self) -> Result<regex::Regex, ResolveError> {
        let pattern = format!(
            r"\$\s*\{{{}\s*:\s*{}\}}",
            self.target_hierarchy, self.target_property
        );
        regex::Regex::new(&pattern).map_err(|source| ResolveError::Pattern { pattern, source })
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> ${{{}:{}}}",
            self.location, self.source_property, self.target_hierarchy, self.target_property
        )
    }
}

/// Replace every reference placeholder with the value it points at
#[tracing::instrument(level = "debug", skip_all, fields(references = references.len()))]
pub fn dereference(tree: &mut Properties, references: &[Reference]) -> Result<(), ResolveError> {
    for reference in references {
        let location = tree
            .find(&reference.location)
            .ok_or_else(|| ResolveError::MissingLocation(reference.clone()))?;

        let target = tree
            .node(&reference.target_hierarchy)
            .ok_or_else(|| ResolveError::MissingTarget(reference.clone()))?;
        let replacement = target
            .property(&reference.target_property)
            .ok_or_else(|| ResolveError::MissingTargetProperty(reference.clone()))?
            .to_string();

        let value = tree
            .node_by_id(location)
            .property(&reference.source_property)
            .ok_or_else(|| ResolveError::MissingSourceProperty(reference.clone()))?;

        // the target value is a replacement template, `$name` in it expands
        let resolved = reference
            .pattern()?
            .replace(value, replacement.as_str())
            .into_owned();

        tracing::trace!(%reference, %resolved, "reference resolved");
        tree.insert_property(location, reference.source_property.clone(), resolved);
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("node {} does not exist ({0})", .0.location)]
    MissingLocation(Reference),
    #[error("referenced node {} does not exist ({0})", .0.target_hierarchy)]
    MissingTarget(Reference),
    #[error("referenced property {} not found in {} ({0})", .0.target_property, .0.target_hierarchy)]
    MissingTargetProperty(Reference),
    #[error("the property to change cannot be null ({0})")]
    MissingSourceProperty(Reference),
    #[error("invalid reference pattern {pattern}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
