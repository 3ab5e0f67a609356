use serde::Serialize;

/// Operator words recognised inside a license expression.
const OPERATORS: [&str; 3] = ["OR", "AND", "WITH"];

/// Split a license expression into its atomic identifiers, in order.
///
/// Only the operator words split; operator structure is discarded. Every token
/// has its parentheses deleted and its ends trimmed, inner spacing is kept.
/// Malformed input degrades to whatever tokens can be recovered.
pub fn tokenize(expr: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (word_start, word_end) in word_spans(expr) {
        if OPERATORS.contains(&&expr[word_start..word_end]) {
            push_token(&mut tokens, &expr[start..word_start]);
            start = word_end;
        }
    }
    push_token(&mut tokens, &expr[start..]);
    tokens
}

fn push_token(tokens: &mut Vec<String>, segment: &str) {
    let token = segment.replace(['(', ')'], "");
    let token = token.trim();
    if !token.is_empty() {
        tokens.push(token.to_string());
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')'
}

/// Byte spans of the words of `expr`, delimited by whitespace and parentheses.
fn word_spans(expr: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut word_start = None;
    for (i, c) in expr.char_indices() {
        match (word_start, is_delimiter(c)) {
            (None, false) => word_start = Some(i),
            (Some(start), true) => {
                spans.push((start, i));
                word_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = word_start {
        spans.push((start, expr.len()));
    }
    spans
}

/// Remove one pair of parentheses when it encloses the entire expression.
///
/// `(MIT OR Apache-2.0)` becomes `MIT OR Apache-2.0`, while
/// `(MIT) OR (Apache-2.0)` is left alone because its first `(` closes early.
pub fn strip_enclosing_parens(expr: &str) -> &str {
    let trimmed = expr.trim();
    if !trimmed.starts_with('(') || !trimmed.ends_with(')') {
        return trimmed;
    }

    let mut depth = 0usize;
    for (idx, c) in trimmed.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if idx == trimmed.len() - 1 {
                        return trimmed[1..idx].trim();
                    }
                    return trimmed;
                }
            }
            _ => {}
        }
    }
    trimmed
}

/// Normalize a raw license cell or literal as stored on a package.
///
/// `NOASSERTION` and `NONE` carry no license and become the empty string.
pub fn normalize_license_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("NOASSERTION") || trimmed.eq_ignore_ascii_case("NONE") {
        return String::new();
    }
    strip_enclosing_parens(trimmed).to_string()
}

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

/// A license expression with its operator structure kept.
///
/// Aggregation only needs [`LicenseExpr::identifiers`]; the tree is carried on
/// the canonical package so consumers can tell a choice from a conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LicenseExpr {
    License { id: String },
    With { license: String, exception: String },
    And { terms: Vec<LicenseExpr> },
    Or { terms: Vec<LicenseExpr> },
}

impl LicenseExpr {
    /// Parse an expression. Returns `None` when it holds no identifier at all.
    ///
    /// Grammar (AND binds tighter than OR):
    /// ```text
    /// expr     := or_expr
    /// or_expr  := and_expr ( "OR" and_expr )*
    /// and_expr := atom ( "AND" atom )*
    /// atom     := "(" expr ")" | id ( "WITH" id )?
    /// ```
    pub fn parse(expr: &str) -> Option<LicenseExpr> {
        let mut parser = ExprParser {
            tokens: lex(expr),
            pos: 0,
        };

        let mut terms = Vec::new();
        while parser.peek().is_some() {
            match parser.parse_or() {
                Some(term) => terms.push(term),
                None => {
                    // Stray operator or parenthesis: skip it and keep going.
                    parser.consume();
                }
            }
        }
        combine(terms, |terms| LicenseExpr::And { terms })
    }

    /// Atomic identifiers in depth-first order, exceptions included.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            LicenseExpr::License { id } => out.push(id),
            LicenseExpr::With { license, exception } => {
                out.push(license);
                out.push(exception);
            }
            LicenseExpr::And { terms } | LicenseExpr::Or { terms } => {
                for term in terms {
                    term.collect_identifiers(out);
                }
            }
        }
    }

    /// True when the expression offers a choice between alternatives.
    pub fn is_choice(&self) -> bool {
        matches!(self, LicenseExpr::Or { .. })
    }
}

impl std::fmt::Display for LicenseExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LicenseExpr::License { id } => write!(f, "{}", id),
            LicenseExpr::With { license, exception } => write!(f, "{} WITH {}", license, exception),
            LicenseExpr::And { terms } => write_joined(f, terms, " AND "),
            LicenseExpr::Or { terms } => write_joined(f, terms, " OR "),
        }
    }
}

fn write_joined(
    f: &mut std::fmt::Formatter<'_>,
    terms: &[LicenseExpr],
    sep: &str,
) -> std::fmt::Result {
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        match term {
            LicenseExpr::And { .. } | LicenseExpr::Or { .. } => write!(f, "({})", term)?,
            _ => write!(f, "{}", term)?,
        }
    }
    Ok(())
}

fn combine(
    mut terms: Vec<LicenseExpr>,
    wrap: impl FnOnce(Vec<LicenseExpr>) -> LicenseExpr,
) -> Option<LicenseExpr> {
    match terms.len() {
        0 => None,
        1 => terms.pop(),
        _ => Some(wrap(terms)),
    }
}

#[derive(Debug, PartialEq, Clone)]
enum Token {
    Id(String),
    And,
    Or,
    With,
    LParen,
    RParen,
}

/// Runs of non-operator words become one identifier with their inner spacing
/// intact, so identifiers agree with [`tokenize`].
fn lex(expr: &str) -> Vec<Token> {
    fn flush(tokens: &mut Vec<Token>, expr: &str, run: &mut Option<(usize, usize)>) {
        if let Some((start, end)) = run.take() {
            tokens.push(Token::Id(expr[start..end].to_string()));
        }
    }

    let mut tokens = Vec::new();
    let mut run: Option<(usize, usize)> = None;
    let mut words = word_spans(expr).into_iter().peekable();

    for (i, c) in expr.char_indices() {
        if c == '(' || c == ')' {
            flush(&mut tokens, expr, &mut run);
            tokens.push(if c == '(' { Token::LParen } else { Token::RParen });
            continue;
        }
        let Some(&(start, end)) = words.peek() else {
            continue;
        };
        if i != start {
            continue;
        }
        words.next();
        let operator = match &expr[start..end] {
            "AND" => Some(Token::And),
            "OR" => Some(Token::Or),
            "WITH" => Some(Token::With),
            _ => None,
        };
        match operator {
            Some(op) => {
                flush(&mut tokens, expr, &mut run);
                tokens.push(op);
            }
            None => {
                let run_start = run.map_or(start, |(s, _)| s);
                run = Some((run_start, end));
            }
        }
    }
    flush(&mut tokens, expr, &mut run);
    tokens
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Option<LicenseExpr> {
        let mut terms: Vec<LicenseExpr> = self.parse_and().into_iter().collect();
        while matches!(self.peek(), Some(Token::Or)) {
            self.consume();
            terms.extend(self.parse_and());
        }
        combine(terms, |terms| LicenseExpr::Or { terms })
    }

    fn parse_and(&mut self) -> Option<LicenseExpr> {
        let mut terms: Vec<LicenseExpr> = self.parse_atom().into_iter().collect();
        while matches!(self.peek(), Some(Token::And)) {
            self.consume();
            terms.extend(self.parse_atom());
        }
        combine(terms, |terms| LicenseExpr::And { terms })
    }

    fn parse_atom(&mut self) -> Option<LicenseExpr> {
        match self.peek() {
            Some(Token::LParen) => {
                self.consume();
                let inner = self.parse_or();
                if matches!(self.peek(), Some(Token::RParen)) {
                    self.consume();
                }
                inner
            }
            Some(Token::Id(_)) => {
                let id = self.take_id();
                if matches!(self.peek(), Some(Token::With)) {
                    self.consume();
                    let exception = self.take_id();
                    if !exception.is_empty() {
                        return Some(LicenseExpr::With {
                            license: id,
                            exception,
                        });
                    }
                }
                Some(LicenseExpr::License { id })
            }
            _ => None,
        }
    }

    fn take_id(&mut self) -> String {
        match self.peek() {
            Some(Token::Id(word)) => {
                let word = word.clone();
                self.pos += 1;
                word
            }
            _ => String::new(),
        }
    }
}
