//! directive preprocessor
//!
//! Expands `!<...>` directives before the properties grammar sees the text:
//!
//! | directive                         | effect                                                   |
//! |-----------------------------------|----------------------------------------------------------|
//! | `!<file:PATH>` (`classpath`, `http`) | insert the fetched text verbatim                      |
//! | `!<def:KEY=VALUE>`                | define a constant in the current scope                   |
//! | `!<$KEY>`                         | constant of the current scope, empty when undefined      |
//! | `!<$ENV.KEY>`, `!<$SYS.KEY>`      | environment variable / system property, must exist       |
//! | `!<if:VAR==LIT>` `!<elseif:..>` `!<else>` `!<endif>` | conditional block                     |
//! | `!<for VAR = N : [STEP :] M>` `!<endfor>` | repeat the body for each `N..=M`                 |
//!
//! Conditions treat `LIT` as a regular expression that has to match the whole value of `VAR`. Every open
//! conditional has to match for a directive to have an effect, nested conditionals are AND-ed.
//!
//! Conditionals are decided while reading, a loop variable only exists while the loop body is produced and can
//! not be tested by `if`.
pub mod ast;
pub mod directive;

use crate::resource::{External, LoadError, ResourceLoader};
use crate::util::Position;
use ast::{Container, ForNode, IfNode, SyntaxNode};
use directive::{Directive, Located};

/// Expand all directives of `input`
#[tracing::instrument(level = "debug", skip_all)]
pub fn preprocess(input: &str, loader: &dyn ResourceLoader) -> Result<String, PreprocessError> {
    let directives = directive::parse(input)?;

    let mut evaluator = Evaluator::new(loader);
    for located in &directives {
        evaluator.apply(located)?;
    }
    let mut root = evaluator.finish(input)?;

    let mut out = String::with_capacity(input.len());
    root.produce(loader, &mut vec![], &mut out)?;
    Ok(out)
}

/// A loop that saw its `for` but not yet its `endfor`
#[derive(Debug)]
struct OpenLoop {
    node: ForNode,
    /// `false` when the loop was defined in a disabled branch
    active: bool,
    /// number of open conditionals when the loop started
    conditions: usize,
    position: Position,
}

/// Conditional stack and scope stack
struct Evaluator<'l> {
    loader: &'l dyn ResourceLoader,
    conditions: Vec<(IfNode, Position)>,
    root: Container,
    loops: Vec<OpenLoop>,
}

impl<'l> Evaluator<'l> {
    fn new(loader: &'l dyn ResourceLoader) -> Self {
        Self {
            loader,
            conditions: vec![],
            root: Container::default(),
            loops: vec![],
        }
    }

    /// All open conditionals match
    fn gate(&self) -> bool {
        self.conditions.iter().all(|(node, _)| node.matched)
    }

    fn scope(&mut self) -> &mut Container {
        match self.loops.last_mut() {
            Some(open) => &mut open.node.body,
            None => &mut self.root,
        }
    }

    fn lookup(&self, variable: &str) -> Result<String, PreprocessError> {
        let constants = match self.loops.last() {
            Some(open) => &open.node.body.constants,
            None => &self.root.constants,
        };
        constants
            .get(variable)
            .cloned()
            .ok_or_else(|| PreprocessError::UndefinedVariable {
                name: variable.to_string(),
            })
    }

    fn apply(&mut self, located: &Located) -> Result<(), PreprocessError> {
        let position = located.position;
        match &located.directive {
            Directive::Text(text) => {
                if self.gate() {
                    self.scope().push(SyntaxNode::Text(text.to_string()));
                }
            }
            Directive::Include { scheme, locator } => {
                if self.gate() {
                    self.scope().push(SyntaxNode::Include {
                        target: locator.to_string(),
                        scheme: *scheme,
                    });
                }
            }
            Directive::Define { key, value } => {
                if self.gate() {
                    tracing::trace!(key, value, "define");
                    self.scope()
                        .constants
                        .insert(key.to_string(), value.to_string());
                }
            }
            Directive::Var(name) => {
                if self.gate() {
                    self.scope().push(SyntaxNode::Var(name.to_string()));
                }
            }
            Directive::External { kind, name } => {
                if self.gate() {
                    let value = self.external(*kind, name)?;
                    self.scope().push(SyntaxNode::Text(value));
                }
            }
            Directive::If(condition) => {
                let node = IfNode::new(condition, self.lookup(condition.variable)?)?;
                tracing::trace!(?node, "if");
                self.conditions.push((node, position));
            }
            Directive::ElseIf(condition) => {
                let value = self.lookup(condition.variable)?;
                let node = self.open_condition(position, "elseif")?;
                node.replace(condition, value)?;
                tracing::trace!(?node, "elseif");
            }
            Directive::Else => {
                let node = self.open_condition(position, "else")?;
                node.reverse()?;
                tracing::trace!(?node, "else");
            }
            Directive::EndIf => {
                self.open_condition(position, "endif")?;
                self.conditions.pop();
            }
            Directive::For(header) => {
                let constants = self.scope().constants.clone();
                self.loops.push(OpenLoop {
                    node: ForNode::new(header, constants),
                    active: self.gate(),
                    conditions: self.conditions.len(),
                    position,
                });
            }
            Directive::EndFor => {
                let Some(open) = self.loops.pop() else {
                    return Err(syntax(position, "endfor without for"));
                };
                if self.conditions.len() != open.conditions {
                    return Err(syntax(
                        position,
                        format!("endfor closes the loop from {} inside an open if", open.position),
                    ));
                }
                if open.active {
                    self.scope().push(SyntaxNode::For(open.node));
                }
            }
        }
        Ok(())
    }

    /// Innermost conditional, which must have been opened in the current loop
    fn open_condition(
        &mut self,
        position: Position,
        directive: &str,
    ) -> Result<&mut IfNode, PreprocessError> {
        let floor = self.loops.last().map(|open| open.conditions).unwrap_or(0);
        if self.conditions.len() <= floor {
            return Err(syntax(position, format!("{directive} without if")));
        }
        match self.conditions.last_mut() {
            Some((node, _)) => Ok(node),
            None => Err(syntax(position, format!("{directive} without if"))),
        }
    }

    fn external(&self, kind: External, name: &str) -> Result<String, PreprocessError> {
        kind.lookup(self.loader, name)
            .ok_or_else(|| PreprocessError::UndefinedExternal {
                kind,
                name: name.to_string(),
            })
    }

    fn finish(mut self, input: &str) -> Result<Container, PreprocessError> {
        if let Some(open) = self.loops.pop() {
            return Err(syntax(open.position, "for without endfor"));
        }
        if let Some((_, position)) = self.conditions.pop() {
            return Err(syntax(position, "if without endif"));
        }
        tracing::debug!(
            input_len = input.len(),
            nodes = self.root.children.len(),
            "preprocessor tree built"
        );
        Ok(self.root)
    }
}

fn syntax(position: Position, message: impl Into<String>) -> PreprocessError {
    PreprocessError::Syntax {
        line: position.line,
        column: position.column,
        message: message.into(),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PreprocessError {
    #[error("{line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("{name} was not defined")]
    UndefinedVariable { name: String },
    #[error("{kind}.{name} is not set")]
    UndefinedExternal { kind: External, name: String },
    #[error("invalid condition pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unable to include {locator}")]
    Include {
        locator: String,
        #[source]
        source: LoadError,
    },
}
