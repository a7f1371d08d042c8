//! hierarchical properties grammar
//!
//! ```text
//! # line comment
//! // line comment
//! /* block
//!    comment */
//! name = root property
//!
//! [ /server/http ]
//! port: 8080
//! banner = first line \
//! second line        # inline comment, `\#` is a literal '#'
//! home = ${ENV.HOME}/conf
//! url = http://${/server:host}:${/server/http:port}
//! ```
//!
//! `${ENV.NAME}` and `${SYS.NAME}` are substituted while parsing. `${path:key}` stays in the value and is recorded
//! as a [Reference] for [crate::resolve::dereference].
//!
//! A malformed line is logged as an [Issue] and skipped, parsing continues with the next line so one pass reports
//! every problem. The result is only returned when no issue was found.
use crate::resolve::Reference;
use crate::resource::{External, ResourceLoader};
use crate::tree::{NodeId, Properties};
use crate::util::{Position, PositionTracker};
use indexmap::IndexMap;

/// Tree and the references found while building it
#[derive(Debug)]
pub struct Parsed {
    pub properties: Properties,
    pub references: Vec<Reference>,
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn parse(input: &str, loader: &dyn ResourceLoader) -> Result<Parsed, ParseErrors> {
    let mut parser = Parser::new(input, loader);
    let mut errors = ParseErrors::new();

    loop {
        parser.skip_blank();
        if parser.at_end() {
            break;
        }

        if let Err(issue) = parser.element() {
            errors.log(issue);
            parser.skip_line();
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    tracing::debug!(
        nodes = parser.tree.node_count(),
        references = parser.references.len(),
        "properties parsed"
    );
    Ok(Parsed {
        properties: parser.tree,
        references: parser.references,
    })
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    tracker: PositionTracker<'a>,
    loader: &'a dyn ResourceLoader,
    tree: Properties,
    /// node that receives properties and comments
    cursor: NodeId,
    references: Vec<Reference>,
    /// every `${ENV.X}`/`${SYS.X}` seen so far and its value
    externals: IndexMap<(External, String), String>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, loader: &'a dyn ResourceLoader) -> Self {
        let tree = Properties::new();
        let cursor = tree.root_id();
        Self {
            input,
            pos: 0,
            tracker: PositionTracker::new(input),
            loader,
            tree,
            cursor,
            references: vec![],
            externals: IndexMap::new(),
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn position(&self) -> Position {
        self.tracker.at(self.pos)
    }

    fn advance(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn skip_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let rest = self.remaining();
        let len = rest.find(|c: char| !predicate(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_spaces(&mut self) {
        self.skip_while(|c| c == ' ' || c == '\t');
    }

    fn skip_blank(&mut self) {
        self.skip_while(char::is_whitespace);
    }

    fn skip_line(&mut self) {
        match self.remaining().find('\n') {
            Some(index) => self.pos += index + 1,
            None => self.pos = self.input.len(),
        }
    }

    fn element(&mut self) -> Result<(), Issue> {
        let rest = self.remaining();
        if rest.starts_with("/*") {
            self.block_comment()?;
        } else if rest.starts_with('#') || rest.starts_with("//") {
            self.line_comment();
            return Ok(());
        } else if rest.starts_with('[') {
            self.category()?;
        } else if rest.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            self.expression()?;
        } else {
            let c = self.peek().unwrap_or_default();
            return Err(Issue::Unexpected(self.position(), c));
        }
        self.end_of_line()
    }

    /// Only spaces or a comment may follow an element on its line
    fn end_of_line(&mut self) -> Result<(), Issue> {
        self.skip_spaces();
        let rest = self.remaining();
        if rest.starts_with('#') || rest.starts_with("//") {
            self.line_comment();
            return Ok(());
        }
        match self.peek() {
            None => Ok(()),
            Some('\n') => {
                self.advance('\n');
                Ok(())
            }
            Some('\r') => {
                self.advance('\r');
                Ok(())
            }
            Some(_) => Err(Issue::TrailingText(self.position())),
        }
    }

    fn line_comment(&mut self) {
        let marker = if self.remaining().starts_with('#') {
            1
        } else {
            2
        };
        self.pos += marker;
        let text = self.skip_while(|c| c != '\n').trim();
        tracing::trace!(node=%self.tree.hierarchical_name(self.cursor), text, "line comment");
        self.tree.add_line_comment(self.cursor, text);
    }

    fn block_comment(&mut self) -> Result<(), Issue> {
        let start = self.position();
        let body_start = self.pos + 2;
        let Some(len) = self.input[body_start..].find("*/") else {
            self.pos = self.input.len();
            return Err(Issue::UnterminatedComment(start));
        };
        let text = &self.input[body_start..body_start + len];
        self.pos = body_start + len + 2;

        tracing::trace!(node=%self.tree.hierarchical_name(self.cursor), text, "block comment");
        self.tree.add_multiline_comment(self.cursor, text);
        Ok(())
    }

    /// `[ /a/b ]`, a trailing `/` is tolerated
    fn category(&mut self) -> Result<(), Issue> {
        let start = self.position();
        let rest = &self.remaining()[1..];
        let line = rest.split('\n').next().unwrap_or_default();
        let Some(len) = line.find(']') else {
            return Err(Issue::UnterminatedCategory(start));
        };
        let path = &rest[..len];

        let inner = path.trim();
        let inner = inner.strip_prefix('/').unwrap_or(inner);
        let segments: Vec<&str> = inner.split('/').map(str::trim).collect();
        let last = segments.len() - 1;
        let valid = segments.iter().enumerate().all(|(index, segment)| {
            if segment.is_empty() {
                // `[ ]`, `[/]` and `[/a/]`
                index == last
            } else {
                segment.chars().all(|c| c.is_ascii_alphanumeric())
            }
        });
        if !valid {
            return Err(Issue::InvalidCategory(start, path.trim().to_string()));
        }

        self.pos += 1 + len + 1;
        self.cursor = self.tree.get_or_insert_path(path);
        tracing::trace!(node=%self.tree.hierarchical_name(self.cursor), "category");
        Ok(())
    }

    /// `key = value` or `key: value`
    fn expression(&mut self) -> Result<(), Issue> {
        let key = self.skip_while(|c| c.is_ascii_alphanumeric());

        self.skip_spaces();
        match self.peek() {
            Some(c @ (':' | '=')) => self.advance(c),
            _ => return Err(Issue::MissingSeparator(self.position())),
        }
        self.skip_spaces();

        let value_start = self.position();
        let value = self.value(key)?;
        if value.is_empty() {
            return Err(Issue::MissingValue(value_start));
        }

        let value = self.substitute_externals(value);
        tracing::trace!(node=%self.tree.hierarchical_name(self.cursor), key, %value, "property");
        self.tree.insert_property(self.cursor, key, value);
        Ok(())
    }

    /// Raw value up to the end of the line or an inline comment, trailing spaces removed
    fn value(&mut self, key: &str) -> Result<String, Issue> {
        let mut value = String::new();

        while let Some(c) = self.peek() {
            match c {
                '\n' | '\r' | '#' => break,
                '\\' => {
                    let rest = &self.remaining()[1..];
                    if let Some(len) = ["\r\n", "\n", "\r"]
                        .into_iter()
                        .find(|newline| rest.starts_with(*newline))
                        .map(str::len)
                    {
                        value.push('\n');
                        self.pos += 1 + len;
                    } else if rest.starts_with('#') {
                        value.push('#');
                        self.pos += 2;
                    } else {
                        value.push('\\');
                        self.advance('\\');
                    }
                }
                '$' => match self.placeholder(key)? {
                    Some(token) => value.push_str(token),
                    None => {
                        value.push('$');
                        self.advance('$');
                    }
                },
                _ => {
                    value.push(c);
                    self.advance(c);
                }
            }
        }

        let trimmed = value.trim_end_matches([' ', '\t']).len();
        value.truncate(trimmed);
        Ok(value)
    }

    /// `${ENV.X}`, `${SYS.X}` or `${path:key}` at the cursor, consumed and returned as written
    ///
    /// `None` leaves the cursor on the `$`, it is plain text.
    fn placeholder(&mut self, key: &str) -> Result<Option<&'a str>, Issue> {
        let rest = self.remaining();
        let Some(body) = rest.strip_prefix("${") else {
            return Ok(None);
        };
        let line = &body[..body.find(['\n', '\r']).unwrap_or(body.len())];
        let Some(end) = line.find('}') else {
            return Ok(None);
        };
        let body = &body[..end];
        let token = &rest[..end + 3];

        if let Some((prefix, name)) = body.split_once('.') {
            if let Some(kind) = External::from_prefix(prefix) {
                if is_dotted_name(name) {
                    let Some(value) = kind.lookup(self.loader, name) else {
                        return Err(Issue::UndefinedExternal(
                            self.position(),
                            kind,
                            name.to_string(),
                        ));
                    };
                    self.externals.insert((kind, name.to_string()), value);
                    self.pos += token.len();
                    return Ok(Some(token));
                }
            }
        }

        // spaces are allowed around the separator only
        let Some((hierarchy, property)) = body.split_once(':') else {
            return Ok(None);
        };
        let (hierarchy, property) = (hierarchy.trim_end(), property.trim_start());
        let is_path = !hierarchy.is_empty()
            && hierarchy
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '/');
        if !is_path || !is_dotted_name(property) {
            return Ok(None);
        }

        let reference = Reference::new(
            self.tree.hierarchical_name(self.cursor),
            key.to_string(),
            hierarchy.to_string(),
            property.to_string(),
        );
        tracing::trace!(%reference, "reference");
        self.references.push(reference);
        self.pos += token.len();
        Ok(Some(token))
    }

    /// Replace every external seen so far with its value
    fn substitute_externals(&self, value: String) -> String {
        self.externals
            .iter()
            .fold(value, |value, ((kind, name), replacement)| {
                let pattern = format!(r"\$\{{{}\.{}\}}", kind.prefix(), regex::escape(name));
                match regex::Regex::new(&pattern) {
                    Ok(regex) => regex
                        .replace_all(&value, regex::NoExpand(replacement.as_str()))
                        .into_owned(),
                    Err(_) => value,
                }
            })
    }
}

/// Alphanumerics and dots
fn is_dotted_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Issue {
    #[error("{0}: unexpected character {1:?}")]
    Unexpected(Position, char),
    #[error("{0}: unterminated block comment")]
    UnterminatedComment(Position),
    #[error("{0}: missing ']'")]
    UnterminatedCategory(Position),
    #[error("{0}: invalid category [{1}]")]
    InvalidCategory(Position, String),
    #[error("{0}: expected ':' or '=' after the key")]
    MissingSeparator(Position),
    #[error("{0}: missing value")]
    MissingValue(Position),
    #[error("{0}: {1}.{2} is not set")]
    UndefinedExternal(Position, External, String),
    #[error("{0}: unexpected text after the element")]
    TrailingText(Position),
}

/// All issues of one parse
#[derive(derive_new::new, Debug)]
pub struct ParseErrors {
    #[new(default)]
    issues: Vec<Issue>,
}

impl ParseErrors {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(%issue, "issue found");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.issues.as_slice() {
            [] => f.write_str("no issues"),
            [issue] => write!(f, "{issue}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::test::MemoryLoader;
    use pretty_assertions::assert_eq;

    fn parse_ok(input: &str) -> Parsed {
        parse(input, &MemoryLoader::default()).expect("must parse")
    }

    fn issues(input: &str) -> Vec<Issue> {
        parse(input, &MemoryLoader::default())
            .expect_err("must fail")
            .issues()
            .to_vec()
    }

    fn at(line: usize, column: usize) -> Position {
        Position { line, column }
    }

    #[test]
    fn categories_and_properties() {
        let parsed = parse_ok("name = root\n\n[ /Test ]\n[ /Test/child ]\nk = v\n  other: 2\n");
        let tree = &parsed.properties;

        assert_eq!(tree.root().property("name"), Some("root"));
        assert_eq!(tree.node("/Test").unwrap().property_count(), 0);
        let child = tree.node("/Test/child").unwrap();
        assert_eq!(child.property("k"), Some("v"));
        assert_eq!(child.property_as_int("other"), Some(2));
        assert!(parsed.references.is_empty());
    }

    #[test]
    fn category_forms() {
        let tree = parse_ok("[a]\nx=1\n[/b/c/]\ny=2\n[ / ]\nz=3").properties;
        assert_eq!(tree.node("/a").unwrap().property("x"), Some("1"));
        assert_eq!(tree.node("/b/c").unwrap().property("y"), Some("2"));
        assert_eq!(tree.root().property("z"), Some("3"));
    }

    #[test]
    fn category_switches_back_to_existing_node() {
        let tree = parse_ok("[/a]\nx=1\n[/b]\ny=2\n[/a]\nz=3").properties;
        let a = tree.node("/a").unwrap();
        assert_eq!(a.properties().collect::<Vec<_>>(), vec![("x", "1"), ("z", "3")]);
    }

    #[test]
    fn value_text() {
        let tree = parse_ok(concat!(
            "inline = value   # comment\n",
            "hash = a\\#b\n",
            "dollar = $5 and ${not closed\n",
            "spaces = a  b\t \n",
            "url = http://host/x?a=b\n",
        ))
        .properties;
        let root = tree.root();

        assert_eq!(root.property("inline"), Some("value"));
        assert_eq!(root.property("hash"), Some("a#b"));
        assert_eq!(root.property("dollar"), Some("$5 and ${not closed"));
        assert_eq!(root.property("spaces"), Some("a  b"));
        assert_eq!(root.property("url"), Some("http://host/x?a=b"));
        assert_eq!(root.line_comments().collect::<Vec<_>>(), vec![(1, "comment")]);
    }

    #[test]
    fn line_continuation_keeps_newline() {
        let tree = parse_ok("text = first \\\nsecond\\\r\nthird\nnext = 1").properties;
        assert_eq!(tree.root().property("text"), Some("first \nsecond\nthird"));
        assert_eq!(tree.root().property("next"), Some("1"));
    }

    #[test]
    fn comments_attach_at_property_index() {
        let tree = parse_ok(concat!(
            "# header\n",
            "a = 1\n",
            "/* block\n   spans */\n",
            "// before b\n",
            "b = 2\n",
            "# trailing\n",
        ))
        .properties;
        let root = tree.root();

        assert_eq!(
            root.line_comments().collect::<Vec<_>>(),
            vec![(0, "header"), (1, "before b"), (2, "trailing")]
        );
        assert_eq!(
            root.multiline_comments().collect::<Vec<_>>(),
            vec![(1, " block\n   spans ")]
        );
    }

    #[test]
    fn externals_are_substituted() {
        let loader = MemoryLoader::default()
            .env("HOME", "C:\\Users\\me")
            .sys("os.name", "linux");
        let tree = parse("home = ${ENV.HOME}/conf\nos = ${SYS.os.name}-${SYS.os.name}", &loader)
            .unwrap()
            .properties;

        assert_eq!(tree.root().property("home"), Some("C:\\Users\\me/conf"));
        assert_eq!(tree.root().property("os"), Some("linux-linux"));
    }

    #[test]
    fn undefined_external_is_an_issue() {
        assert_eq!(
            issues("a = 1\nb = x${ENV.NOPE}"),
            vec![Issue::UndefinedExternal(at(2, 6), External::Env, "NOPE".to_string())]
        );
    }

    #[test]
    fn references_are_recorded_and_left_in_place() {
        let parsed = parse_ok("[/App]\nsrc = pre-${/Other:key}-post\nalt = ${/Other/deep : x.y}");

        assert_eq!(
            parsed.properties.node("/App").unwrap().property("src"),
            Some("pre-${/Other:key}-post")
        );
        assert_eq!(
            parsed.references,
            vec![
                Reference::new(
                    "/App".to_string(),
                    "src".to_string(),
                    "/Other".to_string(),
                    "key".to_string()
                ),
                Reference::new(
                    "/App".to_string(),
                    "alt".to_string(),
                    "/Other/deep".to_string(),
                    "x.y".to_string()
                ),
            ]
        );
    }

    #[test]
    fn equals_is_not_a_reference_separator() {
        let parsed = parse_ok("[/O]\nkey = X\nsrc = ${/O=key}\nother = ${/O=nokey}");

        assert!(parsed.references.is_empty());
        let node = parsed.properties.node("/O").unwrap();
        assert_eq!(node.property("src"), Some("${/O=key}"));
        assert_eq!(node.property("other"), Some("${/O=nokey}"));
    }

    #[test]
    fn large_document() {
        let mut input: String = (0..40_000).map(|i| format!("key{i} = value {i}\n")).collect();
        input.push_str("broken\n");

        assert_eq!(issues(&input), vec![Issue::MissingSeparator(at(40_001, 7))]);

        input.truncate(input.len() - "broken\n".len());
        let parsed = parse_ok(&input);
        let root = parsed.properties.root();
        assert_eq!(root.property_count(), 40_000);
        assert_eq!(root.property("key39999"), Some("value 39999"));
    }

    #[test]
    fn issues_are_collected_per_line() {
        assert_eq!(
            issues("ok = 1\n= nokey\nkey value\n[ /a b ]\n[/c\nempty =   \nfine = 2\n/* open"),
            vec![
                Issue::Unexpected(at(2, 1), '='),
                Issue::MissingSeparator(at(3, 5)),
                Issue::InvalidCategory(at(4, 1), "/a b".to_string()),
                Issue::UnterminatedCategory(at(5, 1)),
                Issue::MissingValue(at(6, 11)),
                Issue::UnterminatedComment(at(8, 1)),
            ]
        );
    }

    #[test]
    fn trailing_text_after_category() {
        assert_eq!(issues("[/a] extra"), vec![Issue::TrailingText(at(1, 6))]);
    }

    #[test]
    fn display_shows_first_issue() {
        let errors = parse("= a\n= b", &MemoryLoader::default()).unwrap_err();
        assert_eq!(errors.to_string(), "1:1: unexpected character '=' (and 1 more)");
    }
}
