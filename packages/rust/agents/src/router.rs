//! Deterministic message routing.
//!
//! Classification is pure pattern matching plus a parse check — no model
//! call, no sampling — so the same message always takes the same route.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use deskbot_shared::{Route, RoutingDecision};

use crate::math;

/// Classifies messages as `math` or `knowledge`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Router;

impl Router {
    /// Route a message, honoring a forced route when given.
    pub fn route(&self, message: &str, forced: Option<Route>) -> RoutingDecision {
        if let Some(route) = forced {
            return RoutingDecision {
                message: message.to_string(),
                route,
                rationale: "forced".into(),
            };
        }

        let (route, rationale) = classify(message);
        debug!(%route, rationale, "message classified");

        RoutingDecision {
            message: message.to_string(),
            route,
            rationale,
        }
    }
}

/// Arithmetic surface forms: a digit combined with an operator, or a
/// parenthesis-bounded numeric group.
static ARITHMETIC_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)
        \d\s*[+\-*/x×÷]      # digit followed by an operator
      | [+\-*/x×÷]\s*\d      # operator followed by a digit
      | \(\s*\d[^)]*\)       # parenthesis-bounded numeric group
    ")
    .unwrap()
});

fn classify(message: &str) -> (Route, String) {
    if !ARITHMETIC_SURFACE.is_match(message) {
        return (Route::Knowledge, "no arithmetic surface form".into());
    }

    // The message looks numeric. It only routes to math when the fragment
    // parses as a complete expression with at least one operator — this is
    // what keeps "how much is 10% of 50" on the knowledge path.
    match math::extract_expression(message) {
        Some(expr) if expr.has_operator() => (
            Route::Math,
            format!("arithmetic expression detected: {}", expr.text),
        ),
        _ => (
            Route::Knowledge,
            "numeric fragment does not parse as a complete expression".into(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_of(message: &str) -> Route {
        Router.route(message, None).route
    }

    #[test]
    fn arithmetic_message_routes_to_math() {
        assert_eq!(route_of("Quanto é 25 x 4 + 10?"), Route::Math);
        assert_eq!(route_of("(42 * 2) / 6"), Route::Math);
        assert_eq!(route_of("10 / 0"), Route::Math);
    }

    #[test]
    fn plain_question_routes_to_knowledge() {
        assert_eq!(route_of("Como criar uma conta no InfinitePay?"), Route::Knowledge);
        assert_eq!(route_of("Qual a taxa da maquininha?"), Route::Knowledge);
    }

    #[test]
    fn bare_numbers_route_to_knowledge() {
        assert_eq!(route_of("tenho 42 reais na conta"), Route::Knowledge);
        assert_eq!(route_of("pedido 12345"), Route::Knowledge);
    }

    #[test]
    fn tie_favors_knowledge_when_fragment_does_not_parse() {
        // Question mark + numbers, but "10% of 50" has no closed-grammar
        // operator between the numbers.
        assert_eq!(route_of("how much is 10% of 50?"), Route::Knowledge);
    }

    #[test]
    fn tie_favors_math_when_fragment_parses() {
        assert_eq!(route_of("pode calcular 10 / 2 para mim?"), Route::Math);
    }

    #[test]
    fn forced_route_bypasses_classification() {
        let decision = Router.route("Quanto é 25 x 4 + 10?", Some(Route::Knowledge));
        assert_eq!(decision.route, Route::Knowledge);
        assert_eq!(decision.rationale, "forced");

        let decision = Router.route("Como criar uma conta?", Some(Route::Math));
        assert_eq!(decision.route, Route::Math);
    }

    #[test]
    fn classification_is_deterministic() {
        for _ in 0..10 {
            let a = Router.route("Quanto é 25 x 4 + 10?", None);
            assert_eq!(a.route, Route::Math);
            assert_eq!(
                a.rationale,
                "arithmetic expression detected: 25 * 4 + 10"
            );
        }
    }
}
