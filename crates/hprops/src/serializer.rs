//! write a tree back in the properties format
//!
//! Nodes are written in pre-order, every node except the root under its own `[/path]` header. Comments are
//! written before the property they were attached to. Parsing the output gives the same nodes and properties.
use crate::tree::{NodeRef, Properties};
use std::fmt::Write;

pub fn to_string(tree: &Properties) -> String {
    let mut out = String::new();
    // writing to a String does not fail
    let _ = write(tree, &mut out);
    out
}

pub fn write(tree: &Properties, out: &mut impl Write) -> std::fmt::Result {
    let mut first = true;
    for node in tree.iter() {
        if !node.is_root() {
            if !first {
                out.write_char('\n')?;
            }
            writeln!(out, "[{}]", node.hierarchical_name())?;
            first = false;
        }

        let count = node.property_count();
        for (index, (key, value)) in node.properties().enumerate() {
            write_comments(node, index, out)?;
            writeln!(out, "{key} = {}", escape(value))?;
            first = false;
        }
        // comments after the last property
        write_comments(node, count, out)?;
        first &= !node.has_comments();
    }
    Ok(())
}

fn write_comments(node: NodeRef, index: usize, out: &mut impl Write) -> std::fmt::Result {
    for (_, text) in node.multiline_comments().filter(|(at, _)| *at == index) {
        writeln!(out, "/*{text}*/")?;
    }
    for (_, text) in node.line_comments().filter(|(at, _)| *at == index) {
        if text.is_empty() {
            writeln!(out, "#")?;
        } else {
            writeln!(out, "# {text}")?;
        }
    }
    Ok(())
}

/// `#` starts a comment and a newline ends the value, both are escaped
///
/// A trailing `\` would join the next line, a space keeps it literal and is trimmed again when parsing.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 1);
    for c in value.chars() {
        match c {
            '#' => escaped.push_str("\\#"),
            '\n' => escaped.push_str("\\\n"),
            c => escaped.push(c),
        }
    }
    if escaped.ends_with('\\') {
        escaped.push(' ');
    }
    escaped
}
