use crate::error::{Result, TsqlError, GENERIC_ERROR_NUMBER};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::debug;

/// Everything known about a raised error, in the shape error sinks consume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub procedure: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub message: String,
    pub number: i32,
    pub severity: u8,
    pub state: u8,
    pub line: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub trace: Vec<String>,
}

impl ErrorRecord {
    pub fn from_error(err: &TsqlError, procedure: Option<&str>, line: u32) -> Self {
        Self {
            procedure: procedure.map(str::to_string),
            parameters: BTreeMap::new(),
            message: err.to_string(),
            number: err.number(),
            severity: err.severity(),
            state: err.state(),
            line,
            timestamp: Utc::now(),
            trace: Vec::new(),
        }
    }

    pub fn with_parameters<'a, I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        for (name, value) in params {
            self.parameters.insert(name.to_string(), value.to_string());
        }
        self
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }

    /// The error this record describes, for re-raising with `THROW;`.
    pub fn to_error(&self) -> TsqlError {
        TsqlError::Raised {
            number: self.number,
            message: self.message.clone(),
            severity: self.severity,
            state: self.state,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| TsqlError::Invalid(format!("error record serialization failed: {e}")))
    }

    /// Flat XML fragment: one element per field, parameters as child elements.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<error>");
        if let Some(p) = &self.procedure {
            let _ = write!(out, "<procedure>{}</procedure>", xml_escape(p));
        }
        let _ = write!(
            out,
            "<number>{}</number><message>{}</message><severity>{}</severity><state>{}</state><line>{}</line><timestamp>{}</timestamp>",
            self.number,
            xml_escape(&self.message),
            self.severity,
            self.state,
            self.line,
            self.timestamp.to_rfc3339()
        );
        if !self.parameters.is_empty() {
            out.push_str("<parameters>");
            for (name, value) in &self.parameters {
                let _ = write!(
                    out,
                    "<parameter name=\"{}\">{}</parameter>",
                    xml_escape(name),
                    xml_escape(value)
                );
            }
            out.push_str("</parameters>");
        }
        if !self.trace.is_empty() {
            out.push_str("<trace>");
            for frame in &self.trace {
                let _ = write!(out, "<frame>{}</frame>", xml_escape(frame));
            }
            out.push_str("</trace>");
        }
        out.push_str("</error>");
        out
    }
}

pub(crate) fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone)]
enum Region {
    Try,
    Catch(ErrorRecord),
}

/// TRY/CATCH emulation: a stack of protected regions.
///
/// An error raised while a TRY region is innermost turns that region into the matching
/// CATCH region; error introspection reads the innermost CATCH region only.
#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    regions: Vec<Region>,
}

impl ErrorHandler {
    /// Handler for a nested call made from inside a CATCH block: the caller's error stays
    /// visible, but no TRY region is inherited.
    pub fn with_outer(record: Option<ErrorRecord>) -> Self {
        Self {
            regions: record.into_iter().map(Region::Catch).collect(),
        }
    }

    pub fn enter_try(&mut self) {
        self.regions.push(Region::Try);
    }

    /// Leave a TRY region that completed without error.
    pub fn leave_try(&mut self) -> Result<()> {
        match self.regions.last() {
            Some(Region::Try) => {
                self.regions.pop();
                Ok(())
            }
            _ => Err(TsqlError::Invalid("END TRY without matching BEGIN TRY".into())),
        }
    }

    /// Route an error through the innermost TRY region. Returns the caught record, or
    /// hands the error back when no TRY region encloses it.
    pub fn raise(&mut self, record: ErrorRecord) -> std::result::Result<ErrorRecord, ErrorRecord> {
        let Some(idx) = self.regions.iter().rposition(|r| matches!(r, Region::Try)) else {
            return Err(record);
        };
        // Anything opened inside the failing TRY is unwound along with it.
        self.regions.truncate(idx);
        debug!(number = record.number, line = record.line, "error caught");
        self.regions.push(Region::Catch(record.clone()));
        Ok(record)
    }

    pub fn leave_catch(&mut self) -> Result<()> {
        match self.regions.last() {
            Some(Region::Catch(_)) => {
                self.regions.pop();
                Ok(())
            }
            _ => Err(TsqlError::Invalid(
                "END CATCH without matching BEGIN CATCH".into(),
            )),
        }
    }

    /// Error being handled by the innermost enclosing CATCH region.
    pub fn current(&self) -> Option<&ErrorRecord> {
        self.regions.iter().rev().find_map(|r| match r {
            Region::Catch(rec) => Some(rec),
            Region::Try => None,
        })
    }

    pub fn in_try(&self) -> bool {
        self.regions.iter().any(|r| matches!(r, Region::Try))
    }

    pub fn depth(&self) -> usize {
        self.regions.len()
    }

    /// Drop regions left open above `depth`, e.g. by a body that returned early.
    pub fn unwind_to(&mut self, depth: usize) {
        self.regions.truncate(depth);
    }

    /// `THROW;` with no arguments: re-raise the error being handled.
    pub fn rethrow(&self) -> Result<TsqlError> {
        self.current().map(ErrorRecord::to_error).ok_or_else(|| TsqlError::Raised {
            number: 10704,
            message: "To rethrow an error, a THROW statement must be used inside a CATCH block"
                .into(),
            severity: 15,
            state: 1,
        })
    }
}

/// `THROW number, message, state`.
pub fn throw_error(number: i32, message: &str, state: i32) -> Result<TsqlError> {
    if number < GENERIC_ERROR_NUMBER {
        return Err(TsqlError::Raised {
            number: 35100,
            message: format!("Error number {number} in the THROW statement is outside the valid range"),
            severity: 16,
            state: 10,
        });
    }
    if !(0..=255).contains(&state) {
        return Err(TsqlError::Invalid(format!("THROW state {state} is out of range")));
    }
    Ok(TsqlError::Raised {
        number,
        message: message.to_string(),
        severity: 16,
        state: state as u8,
    })
}

/// printf-style substitution used by RAISERROR and FORMATMESSAGE
/// (`%s %d %i %u %o %x %X %%`, with flags, width and precision).
pub fn format_message(template: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_arg = args.iter();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut flags = String::new();
        while let Some(&f) = chars.peek() {
            if matches!(f, '-' | '+' | '0' | ' ' | '#') {
                flags.push(f);
                chars.next();
            } else {
                break;
            }
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() || d == '*' {
                width.push(d);
                chars.next();
            } else {
                break;
            }
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '*' {
                    p.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            precision = Some(p);
        }
        // Size prefixes are accepted and ignored.
        while matches!(chars.peek(), Some('h') | Some('l') | Some('I')) {
            chars.next();
        }

        let width: usize = if width == "*" {
            next_arg.next().map(|v| v.as_int().max(0) as usize).unwrap_or(0)
        } else {
            width.parse().unwrap_or(0)
        };
        let precision: Option<usize> = match precision.as_deref() {
            Some("*") => next_arg.next().map(|v| v.as_int().max(0) as usize),
            Some(p) => p.parse().ok(),
            None => None,
        };

        let Some(kind) = chars.next() else {
            out.push('%');
            break;
        };
        let arg = next_arg.next();
        let body = match (kind, arg) {
            (_, None) => "(null)".to_string(),
            (_, Some(v)) if v.is_null() => "(null)".to_string(),
            ('s', Some(v)) => {
                let s = v.as_string();
                match precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            ('d' | 'i', Some(v)) => {
                let n = v.as_int();
                if flags.contains('+') && n >= 0 {
                    format!("+{n}")
                } else {
                    n.to_string()
                }
            }
            ('u', Some(v)) => (v.as_int() as u64 as u32).to_string(),
            ('o', Some(v)) => format!("{:o}", v.as_int() as u32),
            ('x', Some(v)) => {
                let prefix = if flags.contains('#') { "0x" } else { "" };
                format!("{prefix}{:x}", v.as_int() as u32)
            }
            ('X', Some(v)) => {
                let prefix = if flags.contains('#') { "0X" } else { "" };
                format!("{prefix}{:X}", v.as_int() as u32)
            }
            (other, Some(_)) => format!("%{other}"),
        };

        let len = body.chars().count();
        if len >= width {
            out.push_str(&body);
        } else if flags.contains('-') {
            out.push_str(&body);
            out.push_str(&" ".repeat(width - len));
        } else if flags.contains('0') && kind != 's' {
            let (sign, digits) = match body.strip_prefix('-') {
                Some(rest) => ("-", rest.to_string()),
                None => ("", body.clone()),
            };
            out.push_str(sign);
            out.push_str(&"0".repeat(width - len));
            out.push_str(&digits);
        } else {
            out.push_str(&" ".repeat(width - len));
            out.push_str(&body);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(msg: &str) -> ErrorRecord {
        ErrorRecord::from_error(&TsqlError::Invalid(msg.into()), Some("usp_test"), 12)
    }

    #[test]
    fn state_is_visible_only_inside_catch() {
        let mut h = ErrorHandler::default();
        assert!(h.current().is_none());
        h.enter_try();
        assert!(h.current().is_none());
        let caught = h.raise(record("boom")).unwrap();
        assert_eq!(caught.line, 12);
        assert_eq!(h.current().unwrap().procedure.as_deref(), Some("usp_test"));
        h.leave_catch().unwrap();
        assert!(h.current().is_none());
        assert_eq!(h.depth(), 0);
    }

    #[test]
    fn uncaught_errors_are_handed_back() {
        let mut h = ErrorHandler::default();
        let rec = h.raise(record("nobody listening")).unwrap_err();
        assert_eq!(rec.message, "Invalid: nobody listening");
    }

    #[test]
    fn nested_regions_catch_at_nearest_try() {
        let mut h = ErrorHandler::default();
        h.enter_try();
        h.enter_try();
        h.raise(record("inner")).unwrap();
        assert_eq!(h.current().unwrap().message, "Invalid: inner");
        // an error inside the inner CATCH goes to the outer TRY
        h.raise(record("outer")).unwrap();
        assert_eq!(h.current().unwrap().message, "Invalid: outer");
        h.leave_catch().unwrap();
        assert_eq!(h.depth(), 0);
    }

    #[test]
    fn rethrow_outside_catch_fails() {
        let h = ErrorHandler::default();
        assert!(h.rethrow().is_err());
    }

    #[test]
    fn throw_validates_number() {
        assert!(throw_error(50001, "custom", 1).is_ok());
        assert!(throw_error(100, "too low", 1).is_err());
        let e = throw_error(51000, "x", 3).unwrap();
        assert_eq!((e.number(), e.state()), (51000, 3));
    }

    #[test]
    fn printf_substitution() {
        let args = [Value::varchar("orders"), Value::int(42)];
        assert_eq!(
            format_message("Table %s has %d rows (%%)", &args),
            "Table orders has 42 rows (%)"
        );
        assert_eq!(format_message("[%5d]", &[Value::int(7)]), "[    7]");
        assert_eq!(format_message("[%-4s]", &[Value::varchar("ab")]), "[ab  ]");
        assert_eq!(format_message("[%05d]", &[Value::int(-7)]), "[-0007]");
        assert_eq!(format_message("%.2s", &[Value::varchar("abcdef")]), "ab");
        assert_eq!(format_message("%x", &[Value::int(255)]), "ff");
        assert_eq!(format_message("%s", &[]), "(null)");
    }

    #[test]
    fn record_serializes_to_json_and_xml() {
        let rec = record("bad <input>").with_parameters([("@id", &Value::int(5))]);
        let json = rec.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["procedure"], "usp_test");
        assert_eq!(parsed["parameters"]["@id"], "5");
        assert_eq!(parsed["number"], 50000);

        let xml = rec.to_xml();
        assert!(xml.starts_with("<error><procedure>usp_test</procedure>"));
        assert!(xml.contains("<message>Invalid: bad &lt;input&gt;</message>"));
        assert!(xml.contains("<parameter name=\"@id\">5</parameter>"));
    }
}
