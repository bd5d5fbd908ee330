//! Message templates — a format string plus the recipients it fans out to.
//!
//! The format language:
//!
//! - `{name}` named field, `{0}` explicit index, `{}` automatic numbering
//! - `{{` / `}}` literal braces
//! - `{item.title}`, `{item[title]}`, `{0[2]}` for lookups into JSON values
//! - `{name:>10}`, `{price:.2f}`, `{count:,}`, `{delta:+d}`, `{title:*^20.5}`
//!
//! Format specs follow `[[fill]align][sign][0][width][grouping][.precision][type]`
//! with types `s d f F e E g G %`.
//!
//! Arguments are JSON values, so scraped data can be passed through as-is.
//! Strings render without quotes; everything else renders as compact JSON.

use std::iter;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::recipient::Recipient;

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

/// Template expansion failed. Fatal to one expansion, never to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("missing template argument '{0}'")]
    MissingKey(String),

    #[error("missing positional template argument {0}")]
    MissingIndex(usize),

    #[error("cannot switch between automatic and manual field numbering")]
    MixedNumbering,

    #[error("malformed template at byte {position}: {reason}")]
    Malformed {
        position: usize,
        reason: &'static str,
    },

    #[error("unsupported format spec '{0}'")]
    InvalidSpec(String),

    /// The spec is well-formed but does not apply to the value's type,
    /// e.g. `{title:d}` on a string.
    #[error("format spec '{0}' does not apply to this value")]
    IncompatibleSpec(String),

    #[error("template field '{0}' cannot be indexed")]
    NotIndexable(String),
}

// ─────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────

/// Data substituted into a template: an ordered list or a name → value map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateArgs {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl TemplateArgs {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        TemplateArgs::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        TemplateArgs::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Arrays become positional args, objects named args; scalars are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(TemplateArgs::Positional(items)),
            Value::Object(map) => Some(TemplateArgs::Named(map)),
            _ => None,
        }
    }

    fn lookup(&self, arg: &ArgRef) -> Result<&Value, FormatError> {
        match (self, arg) {
            (TemplateArgs::Positional(values), ArgRef::Index(i)) => {
                values.get(*i).ok_or(FormatError::MissingIndex(*i))
            }
            (TemplateArgs::Named(map), ArgRef::Name(name)) => map
                .get(name)
                .ok_or_else(|| FormatError::MissingKey(name.clone())),
            (TemplateArgs::Named(_), ArgRef::Index(i)) => Err(FormatError::MissingIndex(*i)),
            (TemplateArgs::Positional(_), ArgRef::Name(name)) => {
                Err(FormatError::MissingKey(name.clone()))
            }
        }
    }
}

impl From<Vec<Value>> for TemplateArgs {
    fn from(values: Vec<Value>) -> Self {
        TemplateArgs::Positional(values)
    }
}

impl From<Map<String, Value>> for TemplateArgs {
    fn from(map: Map<String, Value>) -> Self {
        TemplateArgs::Named(map)
    }
}

// ─────────────────────────────────────────────
// MessageTemplate
// ─────────────────────────────────────────────

/// An immutable format string and the ordered recipients it is sent to.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageTemplate {
    template: String,
    recipients: Vec<Recipient>,
}

impl MessageTemplate {
    /// Build a template without validating it; errors surface on `expand`.
    pub fn new(template: impl Into<String>, recipients: Vec<Recipient>) -> Self {
        Self {
            template: template.into(),
            recipients,
        }
    }

    /// Build a template and reject malformed format strings up front.
    pub fn parse(
        template: impl Into<String>,
        recipients: Vec<Recipient>,
    ) -> Result<Self, FormatError> {
        let tpl = Self::new(template, recipients);
        parse_format(&tpl.template)?;
        Ok(tpl)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    /// Substitute `args` into the format string once.
    pub fn format(&self, args: &TemplateArgs) -> Result<String, FormatError> {
        let segments = parse_format(&self.template)?;
        let mut out = String::with_capacity(self.template.len());
        for segment in &segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&render_field(field, args)?),
            }
        }
        Ok(out)
    }

    /// Format once and pair the text with every recipient, in order.
    pub fn expand(&self, args: &TemplateArgs) -> Result<Vec<(String, Recipient)>, FormatError> {
        let text = self.format(args)?;
        Ok(self
            .recipients
            .iter()
            .map(|r| (text.clone(), r.clone()))
            .collect())
    }
}

// ─────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq)]
struct Field {
    /// Field text between the braces, kept for error messages.
    raw: String,
    arg: ArgRef,
    path: Vec<String>,
    spec: Option<Spec>,
}

#[derive(Debug, Clone, PartialEq)]
enum ArgRef {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left,
    Right,
    Center,
    /// `=`: padding goes between the sign and the digits.
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Sign {
    Minus,
    Plus,
    Space,
}

/// `[[fill]align][sign][0][width][grouping][.precision][type]`
#[derive(Debug, Clone, PartialEq)]
struct Spec {
    raw: String,
    fill: char,
    align: Option<Align>,
    sign: Sign,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

const SPEC_TYPES: &str = "sdfFeEgG%";

#[derive(Clone, Copy)]
enum Numbering {
    Unset,
    Auto(usize),
    Manual,
}

fn parse_format(format: &str) -> Result<Vec<Segment>, FormatError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut numbering = Numbering::Unset;
    let mut chars = format.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, n)| n == '{').is_some() {
                    literal.push('{');
                    continue;
                }

                let mut body = String::new();
                let mut in_brackets = false;
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    match n {
                        '[' => {
                            in_brackets = true;
                            body.push(n);
                        }
                        ']' => {
                            in_brackets = false;
                            body.push(n);
                        }
                        '}' if !in_brackets => {
                            closed = true;
                            break;
                        }
                        '{' if !in_brackets => {
                            return Err(FormatError::Malformed {
                                position: pos,
                                reason: "nested '{' in replacement field",
                            });
                        }
                        _ => body.push(n),
                    }
                }
                if !closed {
                    return Err(FormatError::Malformed {
                        position: pos,
                        reason: "unclosed '{'",
                    });
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(parse_field(body, pos, &mut numbering)?));
            }
            '}' => {
                if chars.next_if(|&(_, n)| n == '}').is_some() {
                    literal.push('}');
                } else {
                    return Err(FormatError::Malformed {
                        position: pos,
                        reason: "single '}' outside a replacement field",
                    });
                }
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_field(raw: String, pos: usize, numbering: &mut Numbering) -> Result<Field, FormatError> {
    let (name_part, spec_part) = split_spec(&raw);
    if name_part.contains('!') {
        return Err(FormatError::InvalidSpec(raw.clone()));
    }
    let spec = spec_part.map(parse_spec).transpose()?;

    let arg_end = name_part
        .find(|c: char| c == '.' || c == '[')
        .unwrap_or(name_part.len());
    let arg_name = &name_part[..arg_end];

    let arg = if arg_name.is_empty() {
        match *numbering {
            Numbering::Manual => return Err(FormatError::MixedNumbering),
            Numbering::Unset => {
                *numbering = Numbering::Auto(1);
                ArgRef::Index(0)
            }
            Numbering::Auto(next) => {
                *numbering = Numbering::Auto(next + 1);
                ArgRef::Index(next)
            }
        }
    } else if arg_name.chars().all(|c| c.is_ascii_digit()) {
        if let Numbering::Auto(_) = *numbering {
            return Err(FormatError::MixedNumbering);
        }
        *numbering = Numbering::Manual;
        let index = arg_name.parse::<usize>().map_err(|_| FormatError::Malformed {
            position: pos,
            reason: "field index out of range",
        })?;
        ArgRef::Index(index)
    } else {
        ArgRef::Name(arg_name.to_string())
    };

    let path = parse_path(&name_part[arg_end..], pos)?;

    Ok(Field {
        raw: name_part.to_string(),
        arg,
        path,
        spec,
    })
}

/// Split `name[key]:spec` at the first `:` that is not inside brackets.
fn split_spec(raw: &str) -> (&str, Option<&str>) {
    let mut in_brackets = false;
    for (i, c) in raw.char_indices() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            ':' if !in_brackets => return (&raw[..i], Some(&raw[i + 1..])),
            _ => {}
        }
    }
    (raw, None)
}

fn parse_path(mut rest: &str, pos: usize) -> Result<Vec<String>, FormatError> {
    let mut path = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after
                .find(|c: char| c == '.' || c == '[')
                .unwrap_or(after.len());
            if end == 0 {
                return Err(FormatError::Malformed {
                    position: pos,
                    reason: "empty attribute name",
                });
            }
            path.push(after[..end].to_string());
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').ok_or(FormatError::Malformed {
                position: pos,
                reason: "missing ']'",
            })?;
            if end == 0 {
                return Err(FormatError::Malformed {
                    position: pos,
                    reason: "empty index",
                });
            }
            path.push(after[..end].to_string());
            rest = &after[end + 1..];
        } else {
            return Err(FormatError::Malformed {
                position: pos,
                reason: "expected '.' or '[' after field name",
            });
        }
    }
    Ok(path)
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        '=' => Some(Align::AfterSign),
        _ => None,
    }
}

fn parse_spec(raw: &str) -> Result<Spec, FormatError> {
    let invalid = || FormatError::InvalidSpec(raw.to_string());
    let chars: Vec<char> = raw.chars().collect();
    let mut spec = Spec {
        raw: raw.to_string(),
        fill: ' ',
        align: None,
        sign: Sign::Minus,
        width: 0,
        grouping: None,
        precision: None,
        kind: None,
    };
    let mut explicit_fill = false;
    let mut i = 0;

    if let Some(align) = chars.get(1).copied().and_then(align_of) {
        spec.fill = chars[0];
        spec.align = Some(align);
        explicit_fill = true;
        i = 2;
    } else if let Some(align) = chars.first().copied().and_then(align_of) {
        spec.align = Some(align);
        i = 1;
    }

    match chars.get(i) {
        Some('+') => {
            spec.sign = Sign::Plus;
            i += 1;
        }
        Some(' ') => {
            spec.sign = Sign::Space;
            i += 1;
        }
        Some('-') => i += 1,
        _ => {}
    }

    if chars.get(i) == Some(&'0') {
        if !explicit_fill {
            spec.fill = '0';
        }
        spec.align.get_or_insert(Align::AfterSign);
        i += 1;
    }

    let digits = |from: usize| {
        chars[from..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count()
    };

    let n = digits(i);
    if n > 0 {
        let text: String = chars[i..i + n].iter().collect();
        spec.width = text.parse().map_err(|_| invalid())?;
        i += n;
    }

    if let Some(&(sep @ (',' | '_'))) = chars.get(i) {
        spec.grouping = Some(sep);
        i += 1;
    }

    if chars.get(i) == Some(&'.') {
        i += 1;
        let n = digits(i);
        if n == 0 {
            return Err(invalid());
        }
        let text: String = chars[i..i + n].iter().collect();
        spec.precision = Some(text.parse().map_err(|_| invalid())?);
        i += n;
    }

    if let Some(&kind) = chars.get(i) {
        if SPEC_TYPES.contains(kind) {
            spec.kind = Some(kind);
            i += 1;
        }
    }

    if i != chars.len() || (spec.grouping.is_some() && spec.kind == Some('s')) {
        return Err(invalid());
    }
    Ok(spec)
}

// ─────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────

fn render_field(field: &Field, args: &TemplateArgs) -> Result<String, FormatError> {
    let mut value = args.lookup(&field.arg)?;
    for key in &field.path {
        value = match value {
            Value::Object(map) => map
                .get(key)
                .ok_or_else(|| FormatError::MissingKey(key.clone()))?,
            Value::Array(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .ok_or_else(|| FormatError::MissingKey(key.clone()))?,
            _ => return Err(FormatError::NotIndexable(field.raw.clone())),
        };
    }
    match &field.spec {
        Some(spec) => apply_spec(value, spec),
        None => Ok(value_text(value)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_spec(value: &Value, spec: &Spec) -> Result<String, FormatError> {
    let incompatible = || FormatError::IncompatibleSpec(spec.raw.clone());

    // Booleans format as 0/1 under a numeric type code.
    let promoted;
    let value = match (value, spec.kind) {
        (Value::Bool(b), Some(kind)) if kind != 's' => {
            promoted = Value::from(u8::from(*b));
            &promoted
        }
        _ => value,
    };

    let (negative, body, numeric) = match value {
        Value::Number(n) => {
            let (negative, body) = render_number(n, spec).ok_or_else(incompatible)?;
            (negative, body, true)
        }
        other => {
            let numeric_only = spec.sign != Sign::Minus
                || spec.grouping.is_some()
                || spec.align == Some(Align::AfterSign)
                || matches!(spec.kind, Some(kind) if kind != 's');
            if numeric_only {
                return Err(incompatible());
            }
            let text = value_text(other);
            let text = match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            (false, text, false)
        }
    };

    let sign = match (negative, spec.sign) {
        (true, _) => "-",
        (false, Sign::Plus) => "+",
        (false, Sign::Space) => " ",
        (false, Sign::Minus) => "",
    };

    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return Ok(format!("{sign}{body}"));
    }

    let pad = spec.width - len;
    let default_align = if numeric { Align::Right } else { Align::Left };
    let fill = |n: usize| iter::repeat(spec.fill).take(n).collect::<String>();
    Ok(match spec.align.unwrap_or(default_align) {
        Align::Left => format!("{sign}{body}{}", fill(pad)),
        Align::Right => format!("{}{sign}{body}", fill(pad)),
        Align::Center => format!("{}{sign}{body}{}", fill(pad / 2), fill(pad - pad / 2)),
        Align::AfterSign => format!("{sign}{}{body}", fill(pad)),
    })
}

/// Render the magnitude of `n` for `spec`. Returns the sign separately so
/// padding can go between sign and digits. `None` when the type code does
/// not apply to this number.
fn render_number(n: &serde_json::Number, spec: &Spec) -> Option<(bool, String)> {
    let float = n.as_f64()?;
    let integer = n
        .as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from));
    let negative = match integer {
        Some(i) => i < 0,
        None => float.is_sign_negative(),
    };
    let abs = float.abs();

    let body = match (spec.kind, integer) {
        (Some('d'), Some(i)) => i.unsigned_abs().to_string(),
        (Some('d'), None) | (Some('s'), _) => return None,
        (Some('f' | 'F'), _) => format!("{:.*}", spec.precision.unwrap_or(6), abs),
        (Some(kind @ ('e' | 'E')), _) => {
            scientific(abs, spec.precision.unwrap_or(6), kind == 'E')
        }
        (Some(kind @ ('g' | 'G')), _) => {
            general(abs, spec.precision.unwrap_or(6), kind == 'G', false)
        }
        (Some('%'), _) => format!("{:.*}%", spec.precision.unwrap_or(6), abs * 100.0),
        // Integers take no precision without a type code.
        (None, Some(_)) if spec.precision.is_some() => return None,
        (None, Some(i)) => i.unsigned_abs().to_string(),
        (None, None) => match spec.precision {
            Some(p) => general(abs, p, false, true),
            None => n.to_string().trim_start_matches('-').to_string(),
        },
        (Some(_), _) => return None,
    };

    Some((
        negative,
        match spec.grouping {
            Some(sep) => group_digits(&body, sep),
            None => body,
        },
    ))
}

/// `1.5e3` → `1.500000e+03`: explicit exponent sign, at least two digits.
fn scientific(x: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, x);
    let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{sign}{:02}", exp.unsigned_abs())
}

/// `g` presentation: `precision` significant digits, fixed or scientific
/// depending on the exponent, trailing zeros removed. With `keep_point`
/// fixed output keeps at least one decimal (the no-type float form).
fn general(x: f64, precision: usize, upper: bool, keep_point: bool) -> String {
    let p = precision.max(1);
    let exp = if x == 0.0 {
        0
    } else {
        let text = format!("{:.*e}", p - 1, x);
        text.split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0)
    };

    if exp < -4 || exp >= p as i32 {
        let text = scientific(x, p - 1, upper);
        let split = text.find(['e', 'E']).unwrap_or(text.len());
        let (mantissa, exponent) = text.split_at(split);
        return format!("{}{exponent}", trim_fraction(mantissa));
    }

    let decimals = (p as i32 - 1 - exp).max(0) as usize;
    let text = trim_fraction(&format!("{:.*}", decimals, x)).to_string();
    if keep_point && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Insert `sep` every three digits of the leading integer part.
fn group_digits(text: &str, sep: char) -> String {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (int, rest) = text.split_at(end);
    let mut out = String::with_capacity(text.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out.push_str(rest);
    out
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fmt(template: &str, args: TemplateArgs) -> Result<String, FormatError> {
        MessageTemplate::new(template, vec![]).format(&args)
    }

    #[test]
    fn test_expand_fans_out_to_every_recipient() {
        let tpl = MessageTemplate::new(
            "Hello {name}",
            vec![Recipient::user("U1"), Recipient::channel("C1")],
        );
        let out = tpl.expand(&TemplateArgs::named([("name", "Ada")])).unwrap();
        assert_eq!(
            out,
            vec![
                ("Hello Ada".to_string(), Recipient::user("U1")),
                ("Hello Ada".to_string(), Recipient::channel("C1")),
            ]
        );
    }

    #[test]
    fn test_expand_without_recipients_is_empty() {
        let tpl = MessageTemplate::new("{}", vec![]);
        let out = tpl.expand(&TemplateArgs::positional(["x"])).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_positional_implicit() {
        let out = fmt("{} and {}", TemplateArgs::positional(["Monty", "Python"])).unwrap();
        assert_eq!(out, "Monty and Python");
    }

    #[test]
    fn test_positional_explicit_reordered() {
        let out = fmt("{1} before {0}, {1} again", TemplateArgs::positional(["a", "b"])).unwrap();
        assert_eq!(out, "b before a, b again");
    }

    #[test]
    fn test_extra_args_are_ignored() {
        let args = TemplateArgs::named([("name", "Ada"), ("unused", "x")]);
        assert_eq!(fmt("Hi {name}", args).unwrap(), "Hi Ada");
        let args = TemplateArgs::positional(["a", "b", "c"]);
        assert_eq!(fmt("{}", args).unwrap(), "a");
    }

    #[test]
    fn test_missing_named_key() {
        let err = fmt("Hi {name}", TemplateArgs::named([("other", "x")])).unwrap_err();
        assert_eq!(err, FormatError::MissingKey("name".into()));
    }

    #[test]
    fn test_missing_index() {
        let err = fmt("{} {} {}", TemplateArgs::positional(["a", "b"])).unwrap_err();
        assert_eq!(err, FormatError::MissingIndex(2));
    }

    #[test]
    fn test_named_placeholder_with_positional_args() {
        let err = fmt("{name}", TemplateArgs::positional(["a"])).unwrap_err();
        assert_eq!(err, FormatError::MissingKey("name".into()));
    }

    #[test]
    fn test_index_placeholder_with_named_args() {
        let err = fmt("{0}", TemplateArgs::named([("0x", "a")])).unwrap_err();
        assert_eq!(err, FormatError::MissingIndex(0));
    }

    #[test]
    fn test_mixed_numbering_rejected() {
        let args = TemplateArgs::positional(["a", "b"]);
        assert_eq!(fmt("{} {1}", args.clone()), Err(FormatError::MixedNumbering));
        assert_eq!(fmt("{0} {}", args), Err(FormatError::MixedNumbering));
    }

    #[test]
    fn test_escaped_braces() {
        let out = fmt("{{literal}} {x} }}", TemplateArgs::named([("x", 1)])).unwrap();
        assert_eq!(out, "{literal} 1 }");
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(matches!(
            MessageTemplate::parse("oops {", vec![]),
            Err(FormatError::Malformed { position: 5, .. })
        ));
        assert!(matches!(
            MessageTemplate::parse("oops }", vec![]),
            Err(FormatError::Malformed { .. })
        ));
        assert!(MessageTemplate::parse("fine {x}", vec![]).is_ok());
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let args = TemplateArgs::named([
            ("n", json!(12)),
            ("b", json!(true)),
            ("none", Value::Null),
            ("list", json!([1, 2])),
        ]);
        let out = fmt("{n} {b} {none} {list}", args).unwrap();
        assert_eq!(out, "12 true null [1,2]");
    }

    #[test]
    fn test_nested_lookup() {
        let args = TemplateArgs::named([(
            "item",
            json!({"title": "Rust 2.0", "tags": ["lang", "news"]}),
        )]);
        let out = fmt("{item.title} [{item[tags][1]}]", args).unwrap();
        assert_eq!(out, "Rust 2.0 [news]");
    }

    #[test]
    fn test_nested_lookup_missing() {
        let args = TemplateArgs::named([("item", json!({"title": "x"}))]);
        assert_eq!(
            fmt("{item.price}", args),
            Err(FormatError::MissingKey("price".into()))
        );
    }

    #[test]
    fn test_lookup_into_scalar() {
        let args = TemplateArgs::named([("n", json!(3))]);
        assert_eq!(
            fmt("{n.value}", args),
            Err(FormatError::NotIndexable("n.value".into()))
        );
    }

    #[test]
    fn test_format_spec_alignment() {
        let args = TemplateArgs::named([("s", json!("ab")), ("n", json!(7))]);
        assert_eq!(fmt("[{s:>4}]", args.clone()).unwrap(), "[  ab]");
        assert_eq!(fmt("[{s:4}]", args.clone()).unwrap(), "[ab  ]");
        assert_eq!(fmt("[{n:4}]", args.clone()).unwrap(), "[   7]");
        assert_eq!(fmt("[{s:*^6}]", args).unwrap(), "[**ab**]");
    }

    #[test]
    fn test_format_spec_precision() {
        let args = TemplateArgs::named([
            ("price", json!(3.14159)),
            ("whole", json!(3.0)),
            ("title", json!("abcdef")),
        ]);
        // Without a type code, precision counts significant digits.
        assert_eq!(fmt("{price:.2}", args.clone()).unwrap(), "3.1");
        assert_eq!(fmt("{whole:.3}", args.clone()).unwrap(), "3.0");
        assert_eq!(fmt("{title:.3}", args).unwrap(), "abc");
    }

    #[test]
    fn test_format_spec_common_types() {
        let args = TemplateArgs::named([("price", json!(3.14159)), ("n", json!(1234))]);
        assert_eq!(
            fmt("{price:.2f} {n:d} {n:,}", args).unwrap(),
            "3.14 1234 1,234"
        );
    }

    #[test]
    fn test_format_spec_fixed_and_percent() {
        let args = TemplateArgs::named([
            ("x", json!(2.5)),
            ("n", json!(7)),
            ("ratio", json!(0.256)),
            ("big", json!(1234567.891)),
        ]);
        assert_eq!(fmt("{x:f}", args.clone()).unwrap(), "2.500000");
        assert_eq!(fmt("{n:.1f}", args.clone()).unwrap(), "7.0");
        assert_eq!(fmt("{ratio:.1%}", args.clone()).unwrap(), "25.6%");
        assert_eq!(fmt("{big:,.2f}", args.clone()).unwrap(), "1,234,567.89");
        assert_eq!(fmt("{big:_.0f}", args).unwrap(), "1_234_568");
    }

    #[test]
    fn test_format_spec_scientific_and_general() {
        let args = TemplateArgs::named([
            ("x", json!(12345.678)),
            ("small", json!(0.0001234)),
            ("m", json!(1234567.0)),
        ]);
        assert_eq!(fmt("{x:.2e}", args.clone()).unwrap(), "1.23e+04");
        assert_eq!(fmt("{x:.2E}", args.clone()).unwrap(), "1.23E+04");
        assert_eq!(fmt("{small:g}", args.clone()).unwrap(), "0.0001234");
        assert_eq!(fmt("{m:g}", args.clone()).unwrap(), "1.23457e+06");
        assert_eq!(fmt("{x:.3g}", args).unwrap(), "1.23e+04");
    }

    #[test]
    fn test_format_spec_sign_and_zero_pad() {
        let args = TemplateArgs::named([("up", json!(42)), ("down", json!(-42))]);
        assert_eq!(fmt("{up:+d} {down:+d}", args.clone()).unwrap(), "+42 -42");
        assert_eq!(fmt("[{up: d}]", args.clone()).unwrap(), "[ 42]");
        assert_eq!(fmt("{down:06d}", args.clone()).unwrap(), "-00042");
        assert_eq!(fmt("{up:+05}", args.clone()).unwrap(), "+0042");
        assert_eq!(fmt("[{down:=6}]", args).unwrap(), "[-   42]");
    }

    #[test]
    fn test_format_spec_string_type() {
        let args = TemplateArgs::named([("s", json!("ab"))]);
        assert_eq!(fmt("[{s:s}]", args.clone()).unwrap(), "[ab]");
        assert_eq!(fmt("[{s:>4s}]", args).unwrap(), "[  ab]");
    }

    #[test]
    fn test_format_spec_bool_as_number() {
        let args = TemplateArgs::named([("ok", json!(true))]);
        assert_eq!(fmt("{ok:d}", args.clone()).unwrap(), "1");
        assert_eq!(fmt("{ok}", args).unwrap(), "true");
    }

    #[test]
    fn test_format_spec_type_mismatch() {
        let args = TemplateArgs::named([("s", json!("ab")), ("f", json!(1.5)), ("n", json!(3))]);
        assert_eq!(
            fmt("{s:d}", args.clone()),
            Err(FormatError::IncompatibleSpec("d".into()))
        );
        assert_eq!(
            fmt("{s:,}", args.clone()),
            Err(FormatError::IncompatibleSpec(",".into()))
        );
        assert_eq!(
            fmt("{f:d}", args.clone()),
            Err(FormatError::IncompatibleSpec("d".into()))
        );
        assert_eq!(
            fmt("{n:s}", args.clone()),
            Err(FormatError::IncompatibleSpec("s".into()))
        );
        assert_eq!(
            fmt("{n:.2}", args),
            Err(FormatError::IncompatibleSpec(".2".into()))
        );
        assert_eq!(
            MessageTemplate::parse("{x:,s}", vec![]),
            Err(FormatError::InvalidSpec(",s".into()))
        );
    }

    #[test]
    fn test_invalid_spec_and_conversion() {
        let args = TemplateArgs::named([("x", "a")]);
        assert_eq!(
            fmt("{x:abc}", args.clone()),
            Err(FormatError::InvalidSpec("abc".into()))
        );
        assert!(matches!(fmt("{x!r}", args), Err(FormatError::InvalidSpec(_))));
    }

    #[test]
    fn test_args_from_value() {
        assert!(matches!(
            TemplateArgs::from_value(json!([1])),
            Some(TemplateArgs::Positional(_))
        ));
        assert!(matches!(
            TemplateArgs::from_value(json!({"a": 1})),
            Some(TemplateArgs::Named(_))
        ));
        assert!(TemplateArgs::from_value(json!("scalar")).is_none());
    }

    #[test]
    fn test_args_deserialize_untagged() {
        let args: TemplateArgs = serde_json::from_str(r#"{"name": "Ada"}"#).unwrap();
        assert_eq!(args, TemplateArgs::named([("name", "Ada")]));
        let args: TemplateArgs = serde_json::from_str(r#"["a", 1]"#).unwrap();
        assert_eq!(args, TemplateArgs::Positional(vec![json!("a"), json!(1)]));
    }

    #[test]
    fn test_expand_is_repeatable() {
        let tpl = MessageTemplate::new("{}", vec![Recipient::channel("C")]);
        let a = tpl.expand(&TemplateArgs::positional(["one"])).unwrap();
        let b = tpl.expand(&TemplateArgs::positional(["two"])).unwrap();
        assert_eq!(a[0].0, "one");
        assert_eq!(b[0].0, "two");
    }
}
