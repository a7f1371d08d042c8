//! preprocessor grammar
//!
//! Splits the input into literal text runs and `!<...>` directives. Nothing is evaluated here, a directive that
//! sits in a disabled conditional branch still has to be well-formed.
use super::PreprocessError;
use crate::resource::{External, Scheme};
use crate::util::{is_name_char, Position, PositionTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Not,
}

impl Operator {
    pub fn sign(&self) -> &'static str {
        match self {
            Operator::Equals => "==",
            Operator::Not => "!=",
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Operator::Equals => Operator::Not,
            Operator::Not => Operator::Equals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition<'a> {
    pub variable: &'a str,
    pub operator: Operator,
    pub pattern: &'a str,
}

/// `for VAR = START : [STEP :] END`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopHeader<'a> {
    pub var_name: &'a str,
    pub start: i64,
    pub step: Option<i64>,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    Text(&'a str),
    Include { scheme: Scheme, locator: &'a str },
    Define { key: &'a str, value: &'a str },
    Var(&'a str),
    External { kind: External, name: &'a str },
    If(Condition<'a>),
    ElseIf(Condition<'a>),
    Else,
    EndIf,
    For(LoopHeader<'a>),
    EndFor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<'a> {
    pub position: Position,
    pub directive: Directive<'a>,
}

const OPEN: &str = "!<";
const CLOSE: char = '>';

/// Split `input` into text and directives
pub fn parse(input: &str) -> Result<Vec<Located<'_>>, PreprocessError> {
    let mut parser = Parser {
        input,
        pos: 0,
        tracker: PositionTracker::new(input),
    };
    let mut directives = vec![];

    while parser.pos < input.len() {
        let position = parser.position();
        let directive = if parser.remaining().starts_with(OPEN) {
            parser.directive()?
        } else {
            parser.text()
        };

        tracing::trace!(%position, ?directive, "directive");
        directives.push(Located {
            position,
            directive,
        });
    }

    Ok(directives)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    tracker: PositionTracker<'a>,
}

impl<'a> Parser<'a> {
    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn position(&self) -> Position {
        self.tracker.at(self.pos)
    }

    fn error(&self, message: impl Into<String>) -> PreprocessError {
        let Position { line, column } = self.position();
        PreprocessError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn text(&mut self) -> Directive<'a> {
        let rest = self.remaining();
        let len = rest.find(OPEN).unwrap_or(rest.len());
        self.pos += len;
        Directive::Text(&rest[..len])
    }

    fn directive(&mut self) -> Result<Directive<'a>, PreprocessError> {
        let body_start = self.pos + OPEN.len();
        let Some(len) = self.input[body_start..].find(CLOSE) else {
            return Err(self.error("unterminated directive, missing '>'"));
        };
        let body = &self.input[body_start..body_start + len];

        let directive = self.body(body.trim())?;
        self.pos = body_start + len + CLOSE.len_utf8();
        Ok(directive)
    }

    fn body(&self, body: &'a str) -> Result<Directive<'a>, PreprocessError> {
        match body {
            "else" => return Ok(Directive::Else),
            "endif" => return Ok(Directive::EndIf),
            "endfor" => return Ok(Directive::EndFor),
            _ => {}
        }

        if let Some(rest) = body.strip_prefix("elseif:") {
            return Ok(Directive::ElseIf(self.condition(rest)?));
        }

        if let Some(rest) = body.strip_prefix("if:") {
            return Ok(Directive::If(self.condition(rest)?));
        }

        if let Some(rest) = body.strip_prefix("def:") {
            let Some((key, value)) = rest.split_once('=') else {
                return Err(self.error(format!("expected '=' in definition '{body}'")));
            };
            let key = self.name(key.trim())?;
            return Ok(Directive::Define {
                key,
                value: value.trim(),
            });
        }

        if let Some(rest) = body.strip_prefix('$') {
            if let Some((prefix, name)) = rest.split_once('.') {
                if let Some(kind) = External::from_prefix(prefix) {
                    let name = self.name(name)?;
                    return Ok(Directive::External { kind, name });
                }
            }
            return Ok(Directive::Var(self.name(rest)?));
        }

        if let Some(rest) = body.strip_prefix("for") {
            if rest.starts_with([' ', '\t']) {
                return Ok(Directive::For(self.loop_header(rest)?));
            }
        }

        if let Some((prefix, locator)) = body.split_once(':') {
            if let Some(scheme) = Scheme::from_prefix(prefix) {
                let locator = locator.trim();
                if locator.is_empty() {
                    return Err(self.error(format!("empty {scheme} include")));
                }
                return Ok(Directive::Include { scheme, locator });
            }
        }

        Err(self.error(format!("unknown directive '{body}'")))
    }

    fn name(&self, name: &'a str) -> Result<&'a str, PreprocessError> {
        let valid = !name.is_empty() && name.chars().all(is_name_char);
        if valid {
            Ok(name)
        } else {
            Err(self.error(format!("invalid name '{name}'")))
        }
    }

    fn condition(&self, text: &'a str) -> Result<Condition<'a>, PreprocessError> {
        let (operator, index) = [Operator::Equals, Operator::Not]
            .into_iter()
            .filter_map(|op| text.find(op.sign()).map(|index| (op, index)))
            .min_by_key(|(_, index)| *index)
            .ok_or_else(|| self.error(format!("expected '==' or '!=' in condition '{text}'")))?;

        let variable = self.name(text[..index].trim())?;
        let pattern = text[index + operator.sign().len()..].trim();

        Ok(Condition {
            variable,
            operator,
            pattern,
        })
    }

    /// `VAR = N : M` or `VAR = N : S : M`
    ///
    /// All numeric fields are read before deciding which one is the end, so a third number turns the second
    /// into the step.
    fn loop_header(&self, text: &'a str) -> Result<LoopHeader<'a>, PreprocessError> {
        let Some((var_name, range)) = text.split_once('=') else {
            return Err(self.error(format!("expected '=' in loop header '{}'", text.trim())));
        };
        let var_name = self.name(var_name.trim())?;

        let numbers = range
            .split(':')
            .map(|field| {
                let field = field.trim();
                field
                    .parse::<i64>()
                    .map_err(|_| self.error(format!("expected an integer, found '{field}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (start, step, end) = match numbers.as_slice() {
            [start, end] => (*start, None, *end),
            [start, step, end] => (*start, Some(*step), *end),
            _ => {
                return Err(self.error(format!(
                    "expected 'start : end' or 'start : step : end', found '{}'",
                    range.trim()
                )))
            }
        };

        match step {
            Some(0) => return Err(self.error("loop step must not be zero")),
            Some(i64::MIN) => return Err(self.error("loop step out of range")),
            _ => {}
        }

        Ok(LoopHeader {
            var_name,
            start,
            step,
            end,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn directives(input: &str) -> Vec<Directive<'_>> {
        parse(input)
            .expect("must parse")
            .into_iter()
            .map(|located| located.directive)
            .collect()
    }

    fn syntax_error(input: &str) -> (usize, usize) {
        match parse(input).expect_err("must fail") {
            PreprocessError::Syntax { line, column, .. } => (line, column),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn text_and_includes() {
        assert_eq!(
            directives("a = 1\n!<classpath:dir/inc.txt>\n!<file:local.txt>!<http://host/x>"),
            vec![
                Directive::Text("a = 1\n"),
                Directive::Include {
                    scheme: Scheme::Classpath,
                    locator: "dir/inc.txt"
                },
                Directive::Text("\n"),
                Directive::Include {
                    scheme: Scheme::File,
                    locator: "local.txt"
                },
                Directive::Include {
                    scheme: Scheme::Http,
                    locator: "//host/x"
                },
            ]
        );
    }

    #[test]
    fn definitions_and_variables() {
        assert_eq!(
            directives("!<def:env=prod>!<$env>!<$ENV.HOME>!<$SYS.os.name>"),
            vec![
                Directive::Define {
                    key: "env",
                    value: "prod"
                },
                Directive::Var("env"),
                Directive::External {
                    kind: External::Env,
                    name: "HOME"
                },
                Directive::External {
                    kind: External::Sys,
                    name: "os.name"
                },
            ]
        );
    }

    #[test]
    fn conditionals() {
        assert_eq!(
            directives("!<if:env == prod>!<elseif:env!=dev>!<else>!<endif>"),
            vec![
                Directive::If(Condition {
                    variable: "env",
                    operator: Operator::Equals,
                    pattern: "prod"
                }),
                Directive::ElseIf(Condition {
                    variable: "env",
                    operator: Operator::Not,
                    pattern: "dev"
                }),
                Directive::Else,
                Directive::EndIf,
            ]
        );
    }

    #[test]
    fn pattern_may_contain_regex() {
        assert_eq!(
            directives("!<if:env==pro.*|stag(e|ing)>"),
            vec![Directive::If(Condition {
                variable: "env",
                operator: Operator::Equals,
                pattern: "pro.*|stag(e|ing)"
            })]
        );
    }

    #[test]
    fn loop_with_two_fields() {
        assert_eq!(
            directives("!<for i = 1 : 3>!<endfor>"),
            vec![
                Directive::For(LoopHeader {
                    var_name: "i",
                    start: 1,
                    step: None,
                    end: 3
                }),
                Directive::EndFor,
            ]
        );
    }

    #[test]
    fn third_field_turns_second_into_step() {
        assert_eq!(
            directives("!<for i = 10 : -2 : 0>"),
            vec![Directive::For(LoopHeader {
                var_name: "i",
                start: 10,
                step: Some(-2),
                end: 0
            })]
        );
    }

    #[test]
    fn zero_step_is_rejected() {
        assert_eq!(syntax_error("!<for i = 0 : 0 : 4>"), (1, 1));
    }

    #[test]
    fn step_without_magnitude_is_rejected() {
        assert_eq!(
            syntax_error("!<for i = 0 : -9223372036854775808 : 1>x!<endfor>"),
            (1, 1)
        );
        assert!(parse("!<for i = 0 : -9223372036854775807 : 1>").is_ok());
    }

    #[test]
    fn positions_of_many_directives() {
        let input: String = (0..20_000).map(|i| format!("a{i} = !<$x>\n")).collect();
        let located = parse(&input).expect("must parse");

        assert_eq!(located.len(), 40_001);
        let last = &located[located.len() - 2];
        assert_eq!(last.directive, Directive::Var("x"));
        assert_eq!(last.position, Position { line: 20_000, column: 10 });
    }

    #[test]
    fn malformed_directives() {
        assert_eq!(syntax_error("ok\n  !<unknown:thing>"), (2, 3));
        assert_eq!(syntax_error("!<def:novalue>"), (1, 1));
        assert_eq!(syntax_error("!<if:env>"), (1, 1));
        assert_eq!(syntax_error("!<for i = 1>"), (1, 1));
        assert_eq!(syntax_error("!<for i = a : b>"), (1, 1));
        assert_eq!(syntax_error("text !<file:never closed"), (1, 6));
    }
}
