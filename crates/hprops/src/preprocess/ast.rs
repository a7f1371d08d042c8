//! preprocessor syntax tree
//!
//! Only what survived the conditional gate ends up here. Producing the tree turns it into the expanded text,
//! includes are fetched at that point.
//!
//! There is no `If` node: conditionals are decided while reading, [IfNode] only lives on the evaluator's stack and
//! a disabled branch never reaches the tree.
use super::directive::{Condition, LoopHeader, Operator};
use super::PreprocessError;
use crate::resource::{ResourceLoader, Scheme};
use indexmap::IndexMap;

pub type Constants = IndexMap<String, String>;

#[derive(Debug)]
pub enum SyntaxNode {
    Text(String),
    Include { target: String, scheme: Scheme },
    Var(String),
    For(ForNode),
}

/// A scope: ordered children and the constants visible to their `Var`s
#[derive(Debug, Default)]
pub struct Container {
    pub children: Vec<SyntaxNode>,
    pub constants: Constants,
}

impl Container {
    pub fn push(&mut self, node: SyntaxNode) {
        self.children.push(node);
    }

    pub fn produce(
        &mut self,
        loader: &dyn ResourceLoader,
        bindings: &mut Vec<(String, i64)>,
        out: &mut String,
    ) -> Result<(), PreprocessError> {
        for child in self.children.iter_mut() {
            match child {
                SyntaxNode::Text(text) => out.push_str(text),
                SyntaxNode::Include { target, scheme } => {
                    let text = scheme.fetch(loader, target).map_err(|source| {
                        PreprocessError::Include {
                            locator: format!("{scheme}:{target}"),
                            source,
                        }
                    })?;
                    out.push_str(&text);
                }
                SyntaxNode::Var(name) => {
                    if let Some(value) = self.constants.get(name.as_str()) {
                        out.push_str(value);
                    }
                }
                SyntaxNode::For(node) => node.produce(loader, bindings, out)?,
            }
        }
        Ok(())
    }
}

/// A bounded numeric loop, both bounds inclusive
#[derive(Debug)]
pub struct ForNode {
    pub var_name: String,
    pub start: i64,
    pub step: i64,
    pub end: i64,
    pub body: Container,
}

impl ForNode {
    /// `constants` is the enclosing scope at the point the loop is defined
    pub fn new(header: &LoopHeader, constants: Constants) -> Self {
        let magnitude = header.step.unwrap_or(1).saturating_abs();
        let step = if header.start < header.end {
            magnitude
        } else {
            -magnitude
        };

        Self {
            var_name: header.var_name.to_string(),
            start: header.start,
            step,
            end: header.end,
            body: Container {
                children: vec![],
                constants,
            },
        }
    }

    pub fn iterations(&self) -> impl Iterator<Item = i64> {
        let (step, end) = (self.step, self.end);
        std::iter::successors(Some(self.start), move |i| i.checked_add(step)).take_while(
            move |i| {
                if step > 0 {
                    *i <= end
                } else {
                    *i >= end
                }
            },
        )
    }

    /// Produces the body once per iteration
    ///
    /// The loop variable, and the variables of all enclosing loops in `bindings`, are written into the body's
    /// constants before each pass.
    pub fn produce(
        &mut self,
        loader: &dyn ResourceLoader,
        bindings: &mut Vec<(String, i64)>,
        out: &mut String,
    ) -> Result<(), PreprocessError> {
        for i in self.iterations().collect::<Vec<_>>() {
            tracing::trace!(var = %self.var_name, i, "loop iteration");
            bindings.push((self.var_name.clone(), i));
            for (name, value) in bindings.iter() {
                self.body.constants.insert(name.clone(), value.to_string());
            }
            let result = self.body.produce(loader, bindings, out);
            bindings.pop();
            result?;
        }
        Ok(())
    }
}

/// One open conditional, `elseif` and `else` rewrite it in place
#[derive(Debug)]
pub struct IfNode {
    pub variable: String,
    pub pattern: String,
    pub operator: Operator,
    /// value of `variable` when it was looked up
    pub value: String,
    pub matched: bool,
}

impl IfNode {
    pub fn new(condition: &Condition, value: String) -> Result<Self, PreprocessError> {
        let mut node = Self {
            variable: condition.variable.to_string(),
            pattern: condition.pattern.to_string(),
            operator: condition.operator,
            value,
            matched: false,
        };
        node.evaluate()?;
        Ok(node)
    }

    /// The declared literal is the pattern, it has to match the whole looked-up value
    fn evaluate(&mut self) -> Result<(), PreprocessError> {
        let regex = regex::Regex::new(&format!("^(?:{})$", self.pattern)).map_err(|source| {
            PreprocessError::InvalidPattern {
                pattern: self.pattern.clone(),
                source,
            }
        })?;
        let is_match = regex.is_match(&self.value);

        self.matched = match self.operator {
            Operator::Equals => is_match,
            Operator::Not => !is_match,
        };
        Ok(())
    }

    pub fn replace(&mut self, condition: &Condition, value: String) -> Result<(), PreprocessError> {
        self.variable = condition.variable.to_string();
        self.pattern = condition.pattern.to_string();
        self.operator = condition.operator;
        self.value = value;
        self.evaluate()
    }

    /// Flip the operator and re-test the recorded value
    pub fn reverse(&mut self) -> Result<(), PreprocessError> {
        self.operator = self.operator.reverse();
        self.evaluate()
    }
}
