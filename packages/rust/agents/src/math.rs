//! Natural-language math evaluation.
//!
//! Extracts the longest well-formed arithmetic expression from free text,
//! parses it with standard precedence, and evaluates it recording one
//! derivation step per reduction. The grammar is closed over numbers, the
//! four operators, and parentheses — there is no general code evaluation,
//! so message text cannot inject anything executable.

use std::sync::LazyLock;

use regex::Regex;

/// Decimal places kept in results, so output is stable across platforms.
const RESULT_DECIMALS: i32 = 6;

/// Number words normalized to digits before extraction (pt-BR and English).
const NUMBER_WORDS: &[(&str, &str)] = &[
    ("zero", "0"),
    ("um", "1"),
    ("uma", "1"),
    ("one", "1"),
    ("dois", "2"),
    ("duas", "2"),
    ("two", "2"),
    ("três", "3"),
    ("tres", "3"),
    ("three", "3"),
    ("quatro", "4"),
    ("four", "4"),
    ("cinco", "5"),
    ("five", "5"),
    ("seis", "6"),
    ("six", "6"),
    ("sete", "7"),
    ("seven", "7"),
    ("oito", "8"),
    ("eight", "8"),
    ("nove", "9"),
    ("nine", "9"),
    ("dez", "10"),
    ("ten", "10"),
];

// ---------------------------------------------------------------------------
// Errors & outcome
// ---------------------------------------------------------------------------

/// User-level math failures. Always rendered as readable text, never as a
/// raw internal error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("no arithmetic expression found in the message")]
    NoExpressionFound,

    #[error("division by zero")]
    DivisionByZero,

    #[error("malformed expression: {0}")]
    MalformedExpression(String),
}

/// One reduction step of the evaluation, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationStep {
    /// The subexpression being reduced (e.g. "42 * 2").
    pub subexpression: String,
    /// The operator applied.
    pub operator: char,
    /// Left and right operands at reduction time.
    pub operands: (f64, f64),
    /// Result of this reduction.
    pub partial_result: f64,
}

/// A fully evaluated expression with its derivation.
#[derive(Debug, Clone)]
pub struct MathOutcome {
    /// The normalized expression text that was evaluated.
    pub expression_text: String,
    /// Reduction steps, innermost-parenthesis / highest-precedence first.
    pub derivation_steps: Vec<DerivationStep>,
    /// Final result, rounded to a fixed precision.
    pub result: f64,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Evaluates arithmetic found in free-form messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathEvaluator;

impl MathEvaluator {
    /// Evaluate the arithmetic expression contained in `message`.
    ///
    /// A bare literal does not count: without at least one operator there is
    /// nothing to evaluate, and stray digits in prose would otherwise pass.
    pub fn evaluate(&self, message: &str) -> Result<MathOutcome, MathError> {
        let extracted = extract_expression(message).ok_or(MathError::NoExpressionFound)?;
        if !extracted.has_operator() {
            return Err(MathError::NoExpressionFound);
        }

        let mut steps = Vec::new();
        let result = reduce(&extracted.ast, &mut steps)?;

        Ok(MathOutcome {
            expression_text: extracted.text,
            derivation_steps: steps,
            result: round_result(result),
        })
    }

    /// Render an outcome as a stepwise, user-facing explanation.
    pub fn render(&self, outcome: &MathOutcome) -> String {
        let mut lines = vec![format!("Expressão: {}", outcome.expression_text)];
        for (i, step) in outcome.derivation_steps.iter().enumerate() {
            lines.push(format!(
                "Passo {}: {} = {}",
                i + 1,
                step.subexpression,
                format_number(step.partial_result)
            ));
        }
        lines.push(format!("Resultado: {}", format_number(outcome.result)));
        lines.join("\n")
    }

    /// Render a math failure as user-readable text.
    pub fn render_error(&self, error: &MathError) -> String {
        match error {
            MathError::NoExpressionFound => {
                "Não encontrei uma expressão matemática na sua mensagem. \
                 Tente algo como \"25 x 4 + 10\"."
                    .into()
            }
            MathError::DivisionByZero => "Não é possível dividir por zero.".into(),
            MathError::MalformedExpression(detail) => {
                format!("A expressão não pôde ser interpretada ({detail}).")
            }
        }
    }
}

/// Format a result without trailing zeros ("14", "3.5", "0.333333").
pub fn format_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let formatted = format!("{value:.6}");
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn round_result(value: f64) -> f64 {
    let factor = 10f64.powi(RESULT_DECIMALS);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// An expression extracted from a message: its normalized text and AST.
#[derive(Debug, Clone)]
pub struct ExtractedExpr {
    pub text: String,
    pub ast: Expr,
}

impl ExtractedExpr {
    /// Whether the expression contains at least one operator — a bare
    /// literal is not enough to claim a message is arithmetic.
    pub fn has_operator(&self) -> bool {
        self.ast.has_operator()
    }
}

/// Find the longest substring of `message` that parses as a complete
/// arithmetic expression, after normalizing number words and `x`/`×`.
pub fn extract_expression(message: &str) -> Option<ExtractedExpr> {
    static CANDIDATE_RUN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[0-9+\-*/().\s]+").unwrap());

    let normalized = normalize(message);

    let mut best: Option<ExtractedExpr> = None;
    for run in CANDIDATE_RUN.find_iter(&normalized) {
        if let Some(candidate) = parse_candidate(run.as_str()) {
            let is_better = best
                .as_ref()
                .map(|b| candidate.text.chars().count() > b.text.chars().count())
                .unwrap_or(true);
            if is_better {
                best = Some(candidate);
            }
        }
    }
    best
}

/// Normalize a message for extraction: number words to digits, `x`/`×`
/// between numbers to `*`, `÷` to `/`, decimal comma to decimal point.
fn normalize(message: &str) -> String {
    static X_BETWEEN_NUMBERS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)(\d\s*)[x×](\s*\d|\s*\()").unwrap());
    static DECIMAL_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d),(\d)").unwrap());
    static WORD_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
        NUMBER_WORDS
            .iter()
            .map(|(word, digits)| {
                let pattern =
                    Regex::new(&format!(r"(?i)\b{word}\b")).expect("static word pattern");
                (pattern, *digits)
            })
            .collect()
    });

    let mut text = message.to_string();

    for (pattern, digits) in WORD_PATTERNS.iter() {
        text = pattern.replace_all(&text, *digits).into_owned();
    }

    text = text.replace('÷', "/");
    // Matches cannot overlap, so "2x3x4" needs a pass per chained operator.
    loop {
        let replaced = X_BETWEEN_NUMBERS.replace_all(&text, "${1}*${2}").into_owned();
        if replaced == text {
            break;
        }
        text = replaced;
    }
    text = DECIMAL_COMMA.replace_all(&text, "$1.$2").into_owned();
    text
}

/// Try to parse a candidate run, shrinking it from both ends until it forms
/// a complete expression containing a digit, or giving up.
fn parse_candidate(run: &str) -> Option<ExtractedExpr> {
    let mut candidate = run.trim();

    loop {
        if !candidate.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }

        if let Ok(ast) = parse(candidate) {
            return Some(ExtractedExpr {
                text: normalize_spacing(candidate),
                ast,
            });
        }

        // Shed one trailing non-digit, non-')' character and retry; dangling
        // operators and sentence punctuation fall away here.
        let trimmed = candidate.trim_end_matches(|c: char| !c.is_ascii_digit() && c != ')');
        let shrunk = if trimmed.len() < candidate.len() {
            trimmed
        } else {
            // Nothing sheddable at the tail: drop the head character.
            let mut chars = candidate.chars();
            chars.next();
            chars.as_str()
        };

        if shrunk.is_empty() || shrunk == candidate {
            return None;
        }
        candidate = shrunk.trim();
    }
}

/// Collapse whitespace runs so the reported expression text is tidy.
fn normalize_spacing(text: &str) -> String {
    static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
    SPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

// ---------------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------------

/// Expression tree node. The grammar is closed: literals, the four binary
/// operators, and grouping.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Binary {
        op: char,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Group(Box<Expr>),
}

impl Expr {
    fn has_operator(&self) -> bool {
        match self {
            Expr::Literal(_) => false,
            Expr::Binary { .. } => true,
            Expr::Group(inner) => inner.has_operator(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, MathError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| MathError::MalformedExpression(format!("invalid number '{literal}'")))?;
                tokens.push(Token::Number(value));
            }
            other => {
                return Err(MathError::MalformedExpression(format!(
                    "unexpected character '{other}'"
                )));
            }
        }
    }

    Ok(tokens)
}

/// Parse a complete expression; trailing tokens are an error.
pub fn parse(input: &str) -> Result<Expr, MathError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(MathError::MalformedExpression("empty expression".into()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;

    if parser.pos != parser.tokens.len() {
        return Err(MathError::MalformedExpression(
            "unexpected trailing input".into(),
        ));
    }
    Ok(expr)
}

/// Recursive-descent parser:
///
/// ```text
/// expr   := term (('+' | '-') term)*
/// term   := factor (('*' | '/') factor)*
/// factor := number | '-' factor | '(' expr ')'
/// ```
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<Expr, MathError> {
        let mut lhs = self.term()?;

        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, MathError> {
        let mut lhs = self.factor()?;

        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, MathError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Literal(value)),
            Some(Token::Op('-')) => {
                // Unary minus binds to the following factor.
                let inner = self.factor()?;
                match inner {
                    Expr::Literal(value) => Ok(Expr::Literal(-value)),
                    other => Ok(Expr::Binary {
                        op: '-',
                        lhs: Box::new(Expr::Literal(0.0)),
                        rhs: Box::new(other),
                    }),
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(Expr::Group(Box::new(inner))),
                    _ => Err(MathError::MalformedExpression(
                        "missing closing parenthesis".into(),
                    )),
                }
            }
            Some(Token::Op(op)) => Err(MathError::MalformedExpression(format!(
                "unexpected operator '{op}'"
            ))),
            Some(Token::RParen) => Err(MathError::MalformedExpression(
                "unexpected closing parenthesis".into(),
            )),
            None => Err(MathError::MalformedExpression(
                "expression ended unexpectedly".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Post-order reduction: operands reduce before their operator, so inner
/// parentheses and higher-precedence operations are recorded first.
fn reduce(expr: &Expr, steps: &mut Vec<DerivationStep>) -> Result<f64, MathError> {
    match expr {
        Expr::Literal(value) => Ok(*value),
        Expr::Group(inner) => reduce(inner, steps),
        Expr::Binary { op, lhs, rhs } => {
            let left = reduce(lhs, steps)?;
            let right = reduce(rhs, steps)?;

            let value = match op {
                '+' => left + right,
                '-' => left - right,
                '*' => left * right,
                '/' => {
                    if right == 0.0 {
                        return Err(MathError::DivisionByZero);
                    }
                    left / right
                }
                _ => unreachable!("parser only emits the four operators"),
            };

            let partial_result = round_result(value);
            steps.push(DerivationStep {
                subexpression: format!(
                    "{} {op} {}",
                    format_number(round_result(left)),
                    format_number(round_result(right))
                ),
                operator: *op,
                operands: (left, right),
                partial_result,
            });
            Ok(partial_result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(message: &str) -> MathOutcome {
        MathEvaluator.evaluate(message).expect("evaluates")
    }

    #[test]
    fn multiplication_binds_before_addition() {
        let outcome = eval("Quanto é 25 x 4 + 10?");
        assert_eq!(outcome.result, 110.0);
        assert_eq!(outcome.expression_text, "25 * 4 + 10");
        assert_eq!(outcome.derivation_steps.len(), 2);
        assert_eq!(outcome.derivation_steps[0].subexpression, "25 * 4");
        assert_eq!(outcome.derivation_steps[0].partial_result, 100.0);
        assert_eq!(outcome.derivation_steps[1].subexpression, "100 + 10");
    }

    #[test]
    fn parentheses_reduce_first() {
        let outcome = eval("(42 * 2) / 6");
        assert_eq!(outcome.result, 14.0);
        let ops: Vec<char> = outcome.derivation_steps.iter().map(|s| s.operator).collect();
        assert_eq!(ops, vec!['*', '/']);
        assert_eq!(outcome.derivation_steps[0].partial_result, 84.0);
    }

    #[test]
    fn division_by_zero_is_reported_not_panicked() {
        let err = MathEvaluator.evaluate("10 / 0").unwrap_err();
        assert_eq!(err, MathError::DivisionByZero);
    }

    #[test]
    fn division_by_computed_zero_is_reported() {
        let err = MathEvaluator.evaluate("5 / (3 - 3)").unwrap_err();
        assert_eq!(err, MathError::DivisionByZero);
    }

    #[test]
    fn no_expression_in_plain_question() {
        let err = MathEvaluator
            .evaluate("Como criar uma conta no InfinitePay?")
            .unwrap_err();
        assert_eq!(err, MathError::NoExpressionFound);
    }

    #[test]
    fn bare_number_is_not_an_expression_with_operator() {
        // A lone literal extracts, but carries no operator.
        let extracted = extract_expression("tenho 42 reais").unwrap();
        assert!(!extracted.has_operator());
    }

    #[test]
    fn number_words_are_normalized() {
        let outcome = eval("quanto é dois mais 3? ops, dois + 3");
        // "dois + 3" is the parseable fragment after word normalization.
        assert_eq!(outcome.result, 5.0);
    }

    #[test]
    fn times_sign_variants_normalize() {
        assert_eq!(eval("7 × 6").result, 42.0);
        assert_eq!(eval("7x6").result, 42.0);
        assert_eq!(eval("2x3x4").result, 24.0);
        assert_eq!(eval("12 ÷ 4").result, 3.0);
    }

    #[test]
    fn decimal_comma_is_accepted() {
        let outcome = eval("2,5 * 4");
        assert_eq!(outcome.result, 10.0);
    }

    #[test]
    fn left_associativity_at_equal_precedence() {
        let outcome = eval("100 / 5 / 2");
        assert_eq!(outcome.result, 10.0);
        assert_eq!(outcome.derivation_steps[0].subexpression, "100 / 5");
    }

    #[test]
    fn longest_candidate_wins() {
        let outcome = eval("lista 1 e depois 2 + 3 * 4");
        assert_eq!(outcome.expression_text, "2 + 3 * 4");
        assert_eq!(outcome.result, 14.0);
    }

    #[test]
    fn trailing_punctuation_is_shed() {
        let outcome = eval("soma 2 + 2.");
        assert_eq!(outcome.result, 4.0);
    }

    #[test]
    fn unbalanced_parens_do_not_extract() {
        // "(2 + 3" cannot close; the extractor falls back to "2 + 3".
        let outcome = eval("(2 + 3");
        assert_eq!(outcome.result, 5.0);
    }

    #[test]
    fn unary_minus_on_literal() {
        let outcome = eval("-5 + 8");
        assert_eq!(outcome.result, 3.0);
    }

    #[test]
    fn fixed_precision_keeps_output_deterministic() {
        let outcome = eval("1 / 3");
        assert_eq!(outcome.result, 0.333333);
        assert_eq!(format_number(outcome.result), "0.333333");
    }

    #[test]
    fn render_lists_steps_in_order() {
        let outcome = eval("(42 * 2) / 6");
        let rendered = MathEvaluator.render(&outcome);
        assert!(rendered.contains("Passo 1: 42 * 2 = 84"));
        assert!(rendered.contains("Passo 2: 84 / 6 = 14"));
        assert!(rendered.ends_with("Resultado: 14"));
    }

    #[test]
    fn render_error_is_user_readable() {
        let text = MathEvaluator.render_error(&MathError::DivisionByZero);
        assert!(text.contains("zero"));
    }

    #[test]
    fn evaluation_is_deterministic_across_calls() {
        let a = eval("25 x 4 + 10");
        let b = eval("25 x 4 + 10");
        assert_eq!(a.result, b.result);
        assert_eq!(a.derivation_steps, b.derivation_steps);
    }
}
