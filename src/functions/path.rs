//! JSON and XML path extraction over document text.

use super::FunctionRegistry;
use crate::context::ExecutionContext;
use crate::convert;
use crate::error::{Result, TsqlError};
use crate::types::{parse_data_type, DataType};
use crate::value::{Cell, Value};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("JSON_VALUE", 2, Some(2), json_value);
    registry.register("JSON_QUERY", 1, Some(2), json_query);
    registry.register("ISJSON", 1, Some(1), isjson);
    registry.register("JSON_MODIFY", 3, Some(3), json_modify);
    registry.register("XML_VALUE", 2, Some(3), xml_value);
}

fn json_error(number: i32, message: impl Into<String>) -> TsqlError {
    TsqlError::Raised {
        number,
        message: message.into(),
        severity: 16,
        state: 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathMode {
    Lax,
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Key(String),
    Index(usize),
}

#[derive(Debug)]
struct JsonPath {
    mode: PathMode,
    append: bool,
    steps: Vec<Step>,
}

fn bad_path(text: &str, at: usize) -> TsqlError {
    let found = text.chars().nth(at).map(String::from).unwrap_or_default();
    json_error(
        13607,
        format!("JSON path is not properly formatted. Unexpected character '{found}' is found at position {at}."),
    )
}

/// Parses `[append] [lax|strict] $.a."b c"[2]`.
fn parse_path(text: &str, allow_append: bool) -> Result<JsonPath> {
    let mut rest = text.trim_start();
    let mut append = false;
    let mut mode = PathMode::Lax;
    loop {
        let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        match word.to_ascii_lowercase().as_str() {
            "append" if allow_append => append = true,
            "lax" => mode = PathMode::Lax,
            "strict" => mode = PathMode::Strict,
            _ => break,
        }
        rest = rest[word.len()..].trim_start();
    }
    let offset = text.len() - rest.len();
    let chars: Vec<char> = rest.trim_end().chars().collect();
    if chars.first() != Some(&'$') {
        return Err(bad_path(text, offset));
    }
    let mut steps = Vec::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                if chars.get(i) == Some(&'"') {
                    let start = i + 1;
                    let end = chars[start..]
                        .iter()
                        .position(|c| *c == '"')
                        .map(|p| start + p)
                        .ok_or_else(|| bad_path(text, offset + i))?;
                    steps.push(Step::Key(chars[start..end].iter().collect()));
                    i = end + 1;
                } else {
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    if start == i {
                        return Err(bad_path(text, offset + i));
                    }
                    steps.push(Step::Key(chars[start..i].iter().collect()));
                }
            }
            '[' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| start + p)
                    .ok_or_else(|| bad_path(text, offset + i))?;
                let digits: String = chars[start..end].iter().collect();
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| bad_path(text, offset + start))?;
                steps.push(Step::Index(index));
                i = end + 1;
            }
            _ => return Err(bad_path(text, offset + i)),
        }
    }
    Ok(JsonPath { mode, append, steps })
}

fn parse_json(text: &str) -> Result<JsonValue> {
    serde_json::from_str(text).map_err(|_| json_error(13609, "JSON text is not properly formatted."))
}

fn lookup<'a>(doc: &'a JsonValue, steps: &[Step]) -> Option<&'a JsonValue> {
    steps.iter().try_fold(doc, |node, step| match (step, node) {
        (Step::Key(k), JsonValue::Object(map)) => map.get(k),
        (Step::Index(i), JsonValue::Array(items)) => items.get(*i),
        _ => None,
    })
}

fn lookup_mut<'a>(doc: &'a mut JsonValue, steps: &[Step]) -> Option<&'a mut JsonValue> {
    steps.iter().try_fold(doc, |node, step| match (step, node) {
        (Step::Key(k), JsonValue::Object(map)) => map.get_mut(k),
        (Step::Index(i), JsonValue::Array(items)) => items.get_mut(*i),
        _ => None,
    })
}

fn not_found() -> TsqlError {
    json_error(13608, "Property cannot be found on the specified JSON path.")
}

/// Common prologue: NULL document or path yields NULL, otherwise parse both.
fn document_and_path(args: &[Value], default_path: &str) -> Result<Option<(JsonValue, JsonPath)>> {
    let path_arg = args.get(1);
    if args[0].is_null() || path_arg.is_some_and(Value::is_null) {
        return Ok(None);
    }
    let path_text = path_arg.map(Value::as_string).unwrap_or_else(|| default_path.to_string());
    let path = parse_path(&path_text, false)?;
    let doc = parse_json(&args[0].as_string())?;
    Ok(Some((doc, path)))
}

fn json_value(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let null = Value::null(DataType::NVarChar);
    let Some((doc, path)) = document_and_path(args, "$")? else {
        return Ok(null);
    };
    let strict = path.mode == PathMode::Strict;
    let text = match lookup(&doc, &path.steps) {
        None if strict => return Err(not_found()),
        None | Some(JsonValue::Null) => return Ok(null),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(_) if strict => {
            return Err(json_error(13623, "Scalar value cannot be found in the specified JSON path."))
        }
        Some(_) => return Ok(null),
    };
    Ok(Value::string_of(DataType::NVarChar, text, Some(4000)))
}

fn json_query(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let null = Value::null(DataType::NVarChar);
    let Some((doc, path)) = document_and_path(args, "$")? else {
        return Ok(null);
    };
    let strict = path.mode == PathMode::Strict;
    match lookup(&doc, &path.steps) {
        Some(node @ (JsonValue::Object(_) | JsonValue::Array(_))) => Ok(Value::nvarchar(node.to_string())),
        None if strict => Err(not_found()),
        Some(_) if strict => Err(json_error(
            13624,
            "Object or array cannot be found in the specified JSON path.",
        )),
        _ => Ok(null),
    }
}

fn isjson(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::null(DataType::Int));
    }
    let ok = matches!(
        serde_json::from_str::<JsonValue>(&args[0].as_string()),
        Ok(JsonValue::Object(_) | JsonValue::Array(_))
    );
    Ok(Value::int(ok as i32))
}

fn to_json(v: &Value) -> JsonValue {
    match v.cell() {
        Cell::Null => JsonValue::Null,
        Cell::Bool(b) => JsonValue::Bool(*b),
        Cell::Int(i) => JsonValue::from(*i),
        Cell::Float(f) => serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        Cell::Decimal(d) => serde_json::from_str(&d.to_string()).unwrap_or_else(|_| JsonValue::String(d.to_string())),
        _ => JsonValue::String(v.to_string()),
    }
}

fn json_modify(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::null(DataType::NVarChar));
    }
    let path = parse_path(&args[1].as_string(), true)?;
    let mut doc = parse_json(&args[0].as_string())?;
    let strict = path.mode == PathMode::Strict;
    let new_value = to_json(&args[2]);
    let Some((last, parent_steps)) = path.steps.split_last() else {
        return Err(TsqlError::Invalid("JSON_MODIFY cannot replace the root of a document".into()));
    };

    let parent = match lookup_mut(&mut doc, parent_steps) {
        Some(p) => p,
        None if strict => return Err(not_found()),
        None => return Ok(Value::nvarchar(doc.to_string())),
    };

    if path.append {
        let target = match (last, &mut *parent) {
            (Step::Key(k), JsonValue::Object(map)) => {
                if !map.contains_key(k) && !strict {
                    map.insert(k.clone(), JsonValue::Array(Vec::new()));
                }
                map.get_mut(k)
            }
            (Step::Index(i), JsonValue::Array(items)) => items.get_mut(*i),
            _ => None,
        };
        match target {
            Some(JsonValue::Array(items)) => items.push(new_value),
            _ if strict => return Err(json_error(13613, "Array cannot be found in the specified JSON path.")),
            _ => {}
        }
        return Ok(Value::nvarchar(doc.to_string()));
    }

    match (last, parent) {
        (Step::Key(k), JsonValue::Object(map)) => {
            if strict && !map.contains_key(k) {
                return Err(not_found());
            }
            if new_value.is_null() && !strict {
                map.shift_remove(k);
            } else {
                map.insert(k.clone(), new_value);
            }
        }
        (Step::Index(i), JsonValue::Array(items)) => match items.get_mut(*i) {
            Some(slot) => *slot = new_value,
            None if strict => return Err(not_found()),
            None => {}
        },
        _ if strict => return Err(not_found()),
        _ => {}
    }
    Ok(Value::nvarchar(doc.to_string()))
}

#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

#[derive(Debug)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    fn string_value(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.string_value(out),
            }
        }
    }

    fn descendants<'a>(&'a self, out: &mut Vec<&'a XmlElement>) {
        for e in self.elements() {
            out.push(e);
            e.descendants(out);
        }
    }
}

fn xml_error(detail: &str) -> TsqlError {
    json_error(9400, format!("XML parsing: {detail}"))
}

fn decode_entities(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let semi = rest[amp..].find(';').ok_or_else(|| xml_error("illegal name character"))? + amp;
        let entity = &rest[amp + 1..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            e if e.starts_with("#x") => u32::from_str_radix(&e[2..], 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| xml_error("invalid character reference"))?,
            e if e.starts_with('#') => e[1..]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| xml_error("invalid character reference"))?,
            _ => return Err(xml_error("undeclared entity")),
        };
        out.push(decoded);
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Minimal XML reader: elements, attributes, text, CDATA. Comments, processing
/// instructions and doctype declarations are skipped.
fn parse_xml(text: &str) -> Result<XmlElement> {
    let mut stack = vec![XmlElement::default()];
    let mut rest = text;
    while !rest.is_empty() {
        let Some(lt) = rest.find('<') else {
            push_text(&mut stack, rest)?;
            break;
        };
        push_text(&mut stack, &rest[..lt])?;
        rest = &rest[lt..];
        let skip_past = |rest: &str, end: &str| -> Result<usize> {
            rest.find(end).map(|p| p + end.len()).ok_or_else(|| xml_error("unexpected end of input"))
        };
        if rest.starts_with("<!--") {
            rest = &rest[skip_past(rest, "-->")?..];
        } else if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").ok_or_else(|| xml_error("unterminated CDATA section"))?;
            if let Some(top) = stack.last_mut() {
                top.children.push(XmlNode::Text(body[..end].to_string()));
            }
            rest = &body[end + 3..];
        } else if rest.starts_with("<?") {
            rest = &rest[skip_past(rest, "?>")?..];
        } else if rest.starts_with("<!") {
            rest = &rest[skip_past(rest, ">")?..];
        } else if let Some(body) = rest.strip_prefix("</") {
            let gt = body.find('>').ok_or_else(|| xml_error("unexpected end of input"))?;
            let name = body[..gt].trim();
            let done = stack.pop().filter(|e| e.name == name && !e.name.is_empty());
            let (Some(done), Some(parent)) = (done, stack.last_mut()) else {
                return Err(xml_error(&format!("end tag '{name}' does not match the start tag")));
            };
            parent.children.push(XmlNode::Element(done));
            rest = &body[gt + 1..];
        } else {
            let gt = rest.find('>').ok_or_else(|| xml_error("unexpected end of input"))?;
            let inner = &rest[1..gt];
            let (inner, self_closing) = match inner.strip_suffix('/') {
                Some(i) => (i, true),
                None => (inner, false),
            };
            let element = parse_start_tag(inner)?;
            if self_closing {
                if let Some(top) = stack.last_mut() {
                    top.children.push(XmlNode::Element(element));
                }
            } else {
                stack.push(element);
            }
            rest = &rest[gt + 1..];
        }
    }
    if stack.len() != 1 {
        return Err(xml_error("unexpected end of input"));
    }
    stack.pop().ok_or_else(|| xml_error("empty document"))
}

fn push_text(stack: &mut [XmlElement], raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Ok(());
    }
    let text = decode_entities(raw)?;
    if let Some(top) = stack.last_mut() {
        // whitespace between top-level elements is not content
        if !(top.name.is_empty() && text.trim().is_empty()) {
            top.children.push(XmlNode::Text(text));
        }
    }
    Ok(())
}

fn parse_start_tag(inner: &str) -> Result<XmlElement> {
    let inner = inner.trim();
    let name_end = inner.find(char::is_whitespace).unwrap_or(inner.len());
    let name = &inner[..name_end];
    if name.is_empty() {
        return Err(xml_error("illegal qualified name character"));
    }
    let mut attrs = Vec::new();
    let mut rest = inner[name_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(|| xml_error("expected '='"))?;
        let key = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'').ok_or_else(|| xml_error("expected quote"))?;
        let close = after[1..].find(quote).ok_or_else(|| xml_error("unterminated attribute"))? + 1;
        attrs.push((key, decode_entities(&after[1..close])?));
        rest = after[close + 1..].trim_start();
    }
    Ok(XmlElement {
        name: name.to_string(),
        attrs,
        children: Vec::new(),
    })
}

#[derive(Debug, PartialEq)]
enum XmlStep {
    Child { name: String, nth: Option<usize>, descendant: bool },
    Attribute(String),
    Text,
}

fn strip_ordinal(step: &str) -> Result<(&str, Option<usize>)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^([^\[\]]*)\[\s*(\d+)\s*\]$").expect("valid ordinal predicate regex")
    });
    if !step.contains('[') {
        return Ok((step, None));
    }
    let caps = re
        .captures(step)
        .ok_or_else(|| TsqlError::NotSupported(format!("XQuery predicate in '{step}'")))?;
    let name = caps.get(1).map_or("", |m| m.as_str());
    let nth = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| TsqlError::NotSupported(format!("XQuery predicate in '{step}'")))?;
    Ok((name, Some(nth)))
}

/// Parses `/a/b[1]`, `(/a/b)[2]`, `//b`, `/a/@id`, `/a/text()`.
fn parse_xpath(path: &str) -> Result<(Vec<XmlStep>, Option<usize>)> {
    let mut path = path.trim();
    let mut outer = None;
    if let Some(body) = path.strip_prefix('(') {
        let close = body.rfind(')').ok_or_else(|| TsqlError::Invalid(format!("malformed XQuery path '{path}'")))?;
        let (_, nth) = strip_ordinal(&body[close + 1..])?;
        outer = nth;
        path = &body[..close];
    }
    if !path.starts_with('/') {
        return Err(TsqlError::NotSupported(format!("relative XQuery path '{path}'")));
    }
    let mut steps = Vec::new();
    let mut descendant = false;
    for segment in path.split('/').skip(1) {
        if segment.is_empty() {
            descendant = true;
            continue;
        }
        let step = if let Some(attr) = segment.strip_prefix('@') {
            XmlStep::Attribute(attr.to_string())
        } else if segment == "text()" {
            XmlStep::Text
        } else {
            let (name, nth) = strip_ordinal(segment)?;
            XmlStep::Child { name: name.to_string(), nth, descendant }
        };
        descendant = false;
        steps.push(step);
    }
    Ok((steps, outer))
}

fn select_xml(root: &XmlElement, path: &str) -> Result<Option<String>> {
    let (steps, outer) = parse_xpath(path)?;
    let mut current: Vec<&XmlElement> = vec![root];
    for step in &steps {
        match step {
            XmlStep::Child { name, nth, descendant } => {
                let mut next = Vec::new();
                for node in &current {
                    let mut pool = Vec::new();
                    if *descendant {
                        node.descendants(&mut pool);
                    } else {
                        pool.extend(node.elements());
                    }
                    let matching = pool.into_iter().filter(|e| name == "*" || e.name == *name);
                    match nth {
                        Some(n) => next.extend(matching.skip(n.saturating_sub(1)).take(1).filter(|_| *n > 0)),
                        None => next.extend(matching),
                    }
                }
                current = next;
            }
            XmlStep::Attribute(attr) => {
                let values: Vec<String> = current
                    .iter()
                    .filter_map(|e| e.attrs.iter().find(|(k, _)| k == attr).map(|(_, v)| v.clone()))
                    .collect();
                return Ok(pick(values, outer));
            }
            XmlStep::Text => {
                let values: Vec<String> = current.iter().map(|e| e.own_text()).collect();
                return Ok(pick(values, outer));
            }
        }
    }
    let values: Vec<String> = current
        .iter()
        .map(|e| {
            let mut s = String::new();
            e.string_value(&mut s);
            s
        })
        .collect();
    Ok(pick(values, outer))
}

fn pick(values: Vec<String>, outer: Option<usize>) -> Option<String> {
    let index = outer.unwrap_or(1).checked_sub(1)?;
    values.into_iter().nth(index)
}

fn xml_value(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let target = match args.get(2).filter(|v| !v.is_null()) {
        Some(ty) => parse_data_type(&ty.as_string())?,
        None => crate::types::TypeSpec::with_len(DataType::NVarChar, None),
    };
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::null_of(&target));
    }
    let doc = parse_xml(&args[0].as_string())?;
    match select_xml(&doc, &args[1].as_string())? {
        Some(text) => convert::cast(&Value::nvarchar(text), &target),
        None => Ok(Value::null_of(&target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn call(name: &str, args: &[Value]) -> Result<Value> {
        let ctx = ExecutionContext::new(SessionConfig::default());
        FunctionRegistry::new().call(&ctx, name, args)
    }

    fn s(text: &str) -> Value {
        Value::nvarchar(text)
    }

    const DOC: &str = r#"{"name":"Ada","tags":["x","y"],"info":{"age":36,"active":true},"first name":"A"}"#;

    #[test]
    fn json_value_reads_scalars() {
        assert_eq!(call("JSON_VALUE", &[s(DOC), s("$.name")]).unwrap().as_string(), "Ada");
        assert_eq!(call("JSON_VALUE", &[s(DOC), s("$.tags[1]")]).unwrap().as_string(), "y");
        assert_eq!(call("JSON_VALUE", &[s(DOC), s("$.info.age")]).unwrap().as_string(), "36");
        assert_eq!(call("JSON_VALUE", &[s(DOC), s("$.info.active")]).unwrap().as_string(), "true");
        assert_eq!(call("JSON_VALUE", &[s(DOC), s("$.\"first name\"")]).unwrap().as_string(), "A");
        assert!(call("JSON_VALUE", &[s(DOC), s("$.info")]).unwrap().is_null());
        assert!(call("JSON_VALUE", &[s(DOC), s("$.missing")]).unwrap().is_null());
        assert_eq!(call("JSON_VALUE", &[s(DOC), s("strict $.missing")]).unwrap_err().number(), 13608);
        assert_eq!(call("JSON_VALUE", &[s("{oops"), s("$.a")]).unwrap_err().number(), 13609);
        assert_eq!(call("JSON_VALUE", &[s(DOC), s("name")]).unwrap_err().number(), 13607);
    }

    #[test]
    fn json_query_returns_fragments() {
        assert_eq!(call("JSON_QUERY", &[s(DOC), s("$.tags")]).unwrap().as_string(), r#"["x","y"]"#);
        assert_eq!(
            call("JSON_QUERY", &[s(DOC), s("$.info")]).unwrap().as_string(),
            r#"{"age":36,"active":true}"#
        );
        assert!(call("JSON_QUERY", &[s(DOC), s("$.name")]).unwrap().is_null());
        assert_eq!(call("JSON_QUERY", &[s("[1,2]")]).unwrap().as_string(), "[1,2]");
    }

    #[test]
    fn isjson_accepts_objects_and_arrays() {
        assert_eq!(call("ISJSON", &[s(DOC)]).unwrap().as_int(), 1);
        assert_eq!(call("ISJSON", &[s("[]")]).unwrap().as_int(), 1);
        assert_eq!(call("ISJSON", &[s("42")]).unwrap().as_int(), 0);
        assert_eq!(call("ISJSON", &[s("{")]).unwrap().as_int(), 0);
        assert!(call("ISJSON", &[Value::null(DataType::NVarChar)]).unwrap().is_null());
    }

    #[test]
    fn json_modify_sets_and_removes() {
        let out = call("JSON_MODIFY", &[s(r#"{"a":1,"b":2}"#), s("$.a"), Value::int(5)]).unwrap();
        assert_eq!(out.as_string(), r#"{"a":5,"b":2}"#);
        let out = call("JSON_MODIFY", &[s(r#"{"a":1}"#), s("$.c"), s("new")]).unwrap();
        assert_eq!(out.as_string(), r#"{"a":1,"c":"new"}"#);
        let out = call("JSON_MODIFY", &[s(r#"{"a":1,"b":2}"#), s("$.a"), Value::null(DataType::Int)]).unwrap();
        assert_eq!(out.as_string(), r#"{"b":2}"#);
        let out = call("JSON_MODIFY", &[s(r#"{"t":["x"]}"#), s("append $.t"), s("y")]).unwrap();
        assert_eq!(out.as_string(), r#"{"t":["x","y"]}"#);
        let err = call("JSON_MODIFY", &[s(r#"{"a":1}"#), s("strict $.c"), Value::int(1)]).unwrap_err();
        assert_eq!(err.number(), 13608);
    }

    const XML: &str = r#"<?xml version="1.0"?>
        <order id="7"><!-- note -->
          <item sku="A1"><qty>2</qty></item>
          <item sku="B2"><qty>5</qty></item>
          <memo><![CDATA[fragile & heavy]]></memo>
          <owner>Bob &amp; Co</owner>
        </order>"#;

    #[test]
    fn xml_value_follows_simple_paths() {
        assert_eq!(call("XML_VALUE", &[s(XML), s("/order/item[2]/qty")]).unwrap().as_string(), "5");
        assert_eq!(call("XML_VALUE", &[s(XML), s("(/order/item/qty)[1]")]).unwrap().as_string(), "2");
        assert_eq!(call("XML_VALUE", &[s(XML), s("/order/@id")]).unwrap().as_string(), "7");
        assert_eq!(call("XML_VALUE", &[s(XML), s("/order/item[2]/@sku")]).unwrap().as_string(), "B2");
        assert_eq!(call("XML_VALUE", &[s(XML), s("//memo")]).unwrap().as_string(), "fragile & heavy");
        assert_eq!(call("XML_VALUE", &[s(XML), s("/order/owner/text()")]).unwrap().as_string(), "Bob & Co");
        assert!(call("XML_VALUE", &[s(XML), s("/order/item[3]/qty")]).unwrap().is_null());
        let qty = call("XML_VALUE", &[s(XML), s("/order/item[1]/qty"), s("int")]).unwrap();
        assert_eq!((qty.data_type(), qty.as_int()), (DataType::Int, 2));
        assert!(call("XML_VALUE", &[s("<a><b></a>"), s("/a")]).is_err());
    }
}
