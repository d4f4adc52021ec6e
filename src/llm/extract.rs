use serde_json::{Map, Value};

/// Declared container shape for a required output key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    List,
    Object,
}

/// A key the model must emit, with the shape it must have
#[derive(Debug, Clone, Copy)]
pub struct RequiredKey {
    pub name: &'static str,
    pub shape: KeyShape,
}

impl RequiredKey {
    pub const fn list(name: &'static str) -> Self {
        Self {
            name,
            shape: KeyShape::List,
        }
    }

    pub const fn object(name: &'static str) -> Self {
        Self {
            name,
            shape: KeyShape::Object,
        }
    }
}

/// What a stage expects back from the model
#[derive(Debug, Clone, Copy)]
pub struct ExtractionSpec {
    pub required: &'static [RequiredKey],
}

/// Extract the first object in `text` that satisfies `spec`.
///
/// Generated output is untrusted: the payload may be wrapped in prose or
/// code fences, use near-miss key names, or be slightly malformed. Recovery
/// is layered from strict to lenient; rejecting on the first parse failure
/// would make the pipeline unusably fragile against real model output.
pub fn extract_object(text: &str, spec: &ExtractionSpec) -> Option<Map<String, Value>> {
    let cleaned = strip_fences(text);

    for span in brace_spans(&cleaned) {
        if let Some(candidate) = parse_candidate(span) {
            if let Some(accepted) = reconcile(candidate, spec) {
                return Some(accepted);
            }
        }
    }

    // Last resort: treat the whole cleaned text as a single candidate
    parse_candidate(&cleaned).and_then(|candidate| reconcile(candidate, spec))
}

/// Remove code-fence markers and surrounding whitespace
fn strip_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Enumerate every top-level `{...}` span via balanced-brace matching.
///
/// String literals are tracked so braces inside generated prose values do
/// not unbalance the scan.
fn brace_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' if depth > 0 => in_string = Some(c),
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    spans
}

/// Ordered recovery chain: strict JSON, textual repair, lenient literal.
/// Each strategy is a pure function; the first object wins.
fn parse_candidate(span: &str) -> Option<Map<String, Value>> {
    const STRATEGIES: [fn(&str) -> Option<Value>; 3] =
        [parse_strict, parse_repaired, parse_literal];

    for parse in STRATEGIES {
        if let Some(Value::Object(map)) = parse(span) {
            return Some(map);
        }
    }
    None
}

fn parse_strict(span: &str) -> Option<Value> {
    serde_json::from_str(span).ok()
}

/// Repair the most common model mistakes (single quotes, trailing commas)
/// and retry a strict parse
fn parse_repaired(span: &str) -> Option<Value> {
    let repaired = remove_trailing_commas(&span.replace('\'', "\""));
    serde_json::from_str(&repaired).ok()
}

fn remove_trailing_commas(span: &str) -> String {
    let chars: Vec<char> = span.chars().collect();
    let mut out = String::with_capacity(span.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Last-resort parse of a language-neutral object literal: single- or
/// double-quoted strings, bare keys, `True`/`False`/`None`, trailing commas
fn parse_literal(span: &str) -> Option<Value> {
    let mut parser = LiteralParser::new(span);
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    parser.at_end().then_some(value)
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Option<Value> {
        self.skip_whitespace();
        match self.peek()? {
            '{' => self.parse_object(),
            '[' => self.parse_list(),
            '"' | '\'' => self.parse_string().map(Value::String),
            c if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => self.parse_word(),
        }
    }

    fn parse_object(&mut self) -> Option<Value> {
        self.bump(); // '{'
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            match self.peek()? {
                '}' => {
                    self.bump();
                    return Some(Value::Object(map));
                }
                ',' => {
                    self.bump();
                }
                _ => {
                    let key = self.parse_key()?;
                    self.skip_whitespace();
                    if self.bump()? != ':' {
                        return None;
                    }
                    let value = self.parse_value()?;
                    map.insert(key, value);
                }
            }
        }
    }

    fn parse_list(&mut self) -> Option<Value> {
        self.bump(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek()? {
                ']' => {
                    self.bump();
                    return Some(Value::Array(items));
                }
                ',' => {
                    self.bump();
                }
                _ => items.push(self.parse_value()?),
            }
        }
    }

    fn parse_key(&mut self) -> Option<String> {
        self.skip_whitespace();
        match self.peek()? {
            '"' | '\'' => self.parse_string(),
            c if c.is_alphanumeric() || c == '_' => {
                let mut key = String::new();
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_')
                {
                    key.push(self.bump()?);
                }
                Some(key)
            }
            _ => None,
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    other => out.push(other),
                },
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    fn parse_number(&mut self) -> Option<Value> {
        let mut raw = String::new();
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            raw.push(self.bump()?);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Some(Value::Number(n.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    }

    fn parse_word(&mut self) -> Option<Value> {
        let mut word = String::new();
        while self.peek().is_some_and(char::is_alphanumeric) {
            word.push(self.bump()?);
        }
        match word.as_str() {
            "true" | "True" => Some(Value::Bool(true)),
            "false" | "False" => Some(Value::Bool(false)),
            "null" | "None" => Some(Value::Null),
            _ => None,
        }
    }
}

/// Case-/separator-insensitive form used to match near-miss key names
fn canonical(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Edit distance, used to absorb single-character typos in key names
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Find the candidate key that best matches a required key: exact, then
/// canonical equality, then containment (`highlights` for
/// `positive_highlights`), then a single-character typo.
fn find_key(candidate: &Map<String, Value>, required: &str) -> Option<String> {
    if candidate.contains_key(required) {
        return Some(required.to_string());
    }
    let want = canonical(required);
    if let Some(key) = candidate.keys().find(|k| canonical(k) == want) {
        return Some(key.clone());
    }
    if let Some(key) = candidate.keys().find(|k| {
        let have = canonical(k);
        have.len() >= 4 && (want.contains(&have) || have.contains(&want))
    }) {
        return Some(key.clone());
    }
    candidate
        .keys()
        .find(|k| edit_distance(&canonical(k), &want) <= 1)
        .cloned()
}

/// Rename near-miss keys to their required spelling, default missing
/// list-shaped keys to `[]`, and accept the candidate only when every
/// required key ends up present with its declared shape.
///
/// At least one required key must genuinely match before missing keys are
/// defaulted in, so an unrelated object in the output never passes as a
/// payload that happens to allow empty lists everywhere.
fn reconcile(
    mut candidate: Map<String, Value>,
    spec: &ExtractionSpec,
) -> Option<Map<String, Value>> {
    let mut matched = 0usize;
    for required in spec.required {
        match find_key(&candidate, required.name) {
            Some(actual) => {
                matched += 1;
                if actual != required.name {
                    if let Some(value) = candidate.remove(&actual) {
                        candidate.insert(required.name.to_string(), value);
                    }
                }
            }
            None => {
                if required.shape == KeyShape::List {
                    candidate.insert(required.name.to_string(), Value::Array(vec![]));
                }
            }
        }
    }
    if matched == 0 {
        return None;
    }

    let accepted = spec.required.iter().all(|required| {
        matches!(
            (required.shape, candidate.get(required.name)),
            (KeyShape::List, Some(Value::Array(_))) | (KeyShape::Object, Some(Value::Object(_)))
        )
    });
    accepted.then_some(candidate)
}

/// Fetch a string field trying several key spellings
pub fn string_field(map: &Map<String, Value>, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(value) = lookup(map, name) {
            if let Some(s) = value.as_str() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Collect the string items of a list value, skipping anything else
pub fn string_items(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Canonical-form key lookup for shaping helpers
pub(crate) fn lookup<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(name) {
        return Some(value);
    }
    let want = canonical(name);
    map.iter()
        .find(|(k, _)| canonical(k) == want)
        .map(|(_, v)| v)
}
