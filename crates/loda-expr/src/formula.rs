use std::collections::BTreeSet;

use crate::expression::Expression;

/// A named closed-form (or recursive) description of a sequence: an ordered
/// map from a call pattern — e.g. `a(n)` for the general case, `a(0)` for a
/// literal-argument special case recorded before the generator folds it into
/// an `if` — to the expression computing it.
///
/// Entries keep insertion order rather than sorting by key, since the
/// generator relies on literal entries preceding the general one (the order
/// `convertInitialTermsToIf` expects to fold them in).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Formula {
    entries: Vec<(Expression, Expression)>,
}

impl Formula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: Expression, body: Expression) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == pattern) {
            slot.1 = body;
        } else {
            self.entries.push((pattern, body));
        }
    }

    pub fn get(&self, pattern: &Expression) -> Option<&Expression> {
        self.entries.iter().find(|(k, _)| k == pattern).map(|(_, v)| v)
    }

    /// Drops the entry keyed by `pattern`, if any. Used when collapsing an
    /// identity entry (spec §4.H step 10) and when folding a literal-argument
    /// entry into its general counterpart's `if` (step 14).
    pub fn remove(&mut self, pattern: &Expression) {
        self.entries.retain(|(k, _)| k != pattern);
    }

    pub fn entries(&self) -> &[(Expression, Expression)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The function name a call pattern is keyed on, e.g. `a` for `a(n)`.
    fn pattern_name(pattern: &Expression) -> Option<&str> {
        match pattern {
            Expression::Function(name, _) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Every distinct function name this formula defines an entry for
    /// (general and literal alike).
    pub fn defined_names(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|(k, _)| Self::pattern_name(k).map(str::to_string))
            .collect()
    }

    /// The general entry for `name`, i.e. the one keyed by a call with a
    /// bare `Parameter`, as opposed to a literal-argument special case.
    pub fn general_entry(&self, name: &str) -> Option<&Expression> {
        self.entries.iter().find_map(|(k, v)| match k {
            Expression::Function(n, args) if n == name && matches!(args.as_slice(), [Expression::Parameter(_)]) => {
                Some(v)
            }
            _ => None,
        })
    }

    /// Whether `name`'s general entry calls `other` anywhere in its body
    /// (direct call only, not transitively).
    pub fn depends_on(&self, name: &str, other: &str) -> bool {
        self.general_entry(name)
            .map(|body| body.called_functions().contains(other))
            .unwrap_or(false)
    }

    /// True iff any RHS transitively reachable from `name`'s general-case
    /// RHS references `name` again — catches both direct recursion
    /// (`a(n) = a(n-1) + ...`) and mutual recursion (`a` calls `b` calls
    /// `a`).
    pub fn is_recursive(&self, name: &str) -> bool {
        let Some(body) = self.general_entry(name) else {
            return false;
        };
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = body.called_functions().into_iter().collect();
        while let Some(current) = stack.pop() {
            if current == name {
                return true;
            }
            if seen.insert(current.clone()) {
                if let Some(b) = self.general_entry(&current) {
                    stack.extend(b.called_functions());
                }
            }
        }
        false
    }

    /// The transitive closure of functions `name` depends on (excluding
    /// `name` itself, even when reachable through a cycle — see
    /// [`Formula::is_recursive`] for that case).
    pub fn dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let Some(body) = self.general_entry(name) else {
            return seen;
        };
        let mut stack: Vec<String> = body.called_functions().into_iter().collect();
        while let Some(current) = stack.pop() {
            if current != name && seen.insert(current.clone()) {
                if let Some(b) = self.general_entry(&current) {
                    stack.extend(b.called_functions());
                }
            }
        }
        seen
    }

    /// Whether any entry (general or literal-argument) is keyed on `name`.
    pub fn contains_function_def(&self, name: &str) -> bool {
        self.defined_names().contains(name)
    }

    /// `(caller, callee)` pairs over the transitive closure of every
    /// defined function's call graph. When `include_self` is set, a
    /// function that is part of a recursion cycle (direct or mutual) also
    /// contributes a `(name, name)` pair — this is how the generator's
    /// feasibility guard (spec §4.H step 12) counts self-loops.
    pub fn function_deps(&self, include_self: bool) -> BTreeSet<(String, String)> {
        let mut pairs = BTreeSet::new();
        for name in self.defined_names() {
            for callee in self.dependencies(&name) {
                pairs.insert((name.clone(), callee));
            }
            if include_self && self.is_recursive(&name) {
                pairs.insert((name.clone(), name.clone()));
            }
        }
        pairs
    }

    /// The reachable-from-`root_name` subset of this formula: every entry
    /// (general or literal) keyed on `root_name`, plus transitively every
    /// entry keyed on a function any of those bodies call.
    pub fn collect_entries(&self, root_name: &str) -> Formula {
        let mut result = Formula::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue = vec![root_name.to_string()];
        while let Some(name) = queue.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            for (k, v) in &self.entries {
                if Self::pattern_name(k) == Some(name.as_str()) {
                    result.insert(k.clone(), v.clone());
                    for called in v.called_functions() {
                        if !visited.contains(&called) {
                            queue.push(called);
                        }
                    }
                }
            }
        }
        result
    }

    /// The smallest number of literal base cases `name` needs: the largest
    /// literal `k` used as `name`'s argument anywhere in this formula, plus
    /// one; zero if `name` is never called with a literal argument.
    pub fn get_num_initial_terms_needed(&self, name: &str) -> i64 {
        let mut max_k: Option<i64> = None;
        for (_, body) in &self.entries {
            collect_literal_call_args(body, name, &mut max_k);
        }
        max_k.map(|k| k + 1).unwrap_or(0)
    }

    /// Substitutes every call to `name` appearing in `target`, using
    /// `name`'s formula body with its parameter replaced by the call's
    /// actual argument. Self-calls are left untouched — this is what lets a
    /// recursive definition stay recursive after resolution, matching the
    /// original generator's `resolve()` contract.
    pub fn resolve_into(&self, name: &str, target: &Expression) -> Expression {
        let Some(body) = self.general_entry(name) else {
            return target.clone();
        };
        replace_calls(target, name, body)
    }

    /// Renames every call to `old` (in both keys and bodies) to `new`.
    pub fn rename(&mut self, old: &str, new: &str) {
        for (k, v) in &mut self.entries {
            *k = k.rename_function(old, new);
            *v = v.rename_function(old, new);
        }
    }
}

/// Walks `e` recording the largest constant `k` used in a single-argument
/// call `name(k)`, updating `max_k` in place.
fn collect_literal_call_args(e: &Expression, name: &str, max_k: &mut Option<i64>) {
    if let Expression::Function(f, args) = e {
        if f == name {
            if let [Expression::Constant(n)] = args.as_slice() {
                if let Ok(k) = n.as_int() {
                    *max_k = Some(max_k.map_or(k, |m| m.max(k)));
                }
            }
        }
        for a in args {
            collect_literal_call_args(a, name, max_k);
        }
        return;
    }
    match e {
        Expression::Constant(_) | Expression::Parameter(_) => {}
        Expression::Sum(terms) | Expression::Product(terms) => {
            for t in terms {
                collect_literal_call_args(t, name, max_k);
            }
        }
        Expression::Difference(a, b)
        | Expression::Fraction(a, b)
        | Expression::Power(a, b)
        | Expression::Modulus(a, b) => {
            collect_literal_call_args(a, name, max_k);
            collect_literal_call_args(b, name, max_k);
        }
        Expression::If { param, literal, then_branch, else_branch } => {
            collect_literal_call_args(param, name, max_k);
            collect_literal_call_args(literal, name, max_k);
            collect_literal_call_args(then_branch, name, max_k);
            collect_literal_call_args(else_branch, name, max_k);
        }
        Expression::Function(..) => unreachable!("handled above"),
    }
}

fn replace_calls(target: &Expression, name: &str, body: &Expression) -> Expression {
    match target {
        Expression::Function(f, args) if f == name => {
            // Leave the call itself alone (self-reference must stay recursive);
            // still recurse into its arguments, which may call other functions.
            let new_args: Vec<_> = args.iter().map(|a| replace_calls(a, name, body)).collect();
            Expression::Function(f.clone(), new_args)
        }
        Expression::Constant(_) | Expression::Parameter(_) => target.clone(),
        Expression::Function(f, args) => {
            Expression::Function(f.clone(), args.iter().map(|a| replace_calls(a, name, body)).collect())
        }
        Expression::Sum(terms) => Expression::Sum(terms.iter().map(|t| replace_calls(t, name, body)).collect()),
        Expression::Product(factors) => {
            Expression::Product(factors.iter().map(|t| replace_calls(t, name, body)).collect())
        }
        Expression::Difference(a, b) => {
            Expression::difference(replace_calls(a, name, body), replace_calls(b, name, body))
        }
        Expression::Fraction(a, b) => {
            Expression::fraction(replace_calls(a, name, body), replace_calls(b, name, body))
        }
        Expression::Power(a, b) => Expression::power(replace_calls(a, name, body), replace_calls(b, name, body)),
        Expression::Modulus(a, b) => {
            Expression::modulus(replace_calls(a, name, body), replace_calls(b, name, body))
        }
        Expression::If { param, literal, then_branch, else_branch } => Expression::If {
            param: Box::new(replace_calls(param, name, body)),
            literal: Box::new(replace_calls(literal, name, body)),
            then_branch: Box::new(replace_calls(then_branch, name, body)),
            else_branch: Box::new(replace_calls(else_branch, name, body)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str) -> Expression {
        Expression::call(name, vec![Expression::parameter("n")])
    }

    #[test]
    fn test_insert_and_get() {
        let mut f = Formula::new();
        f.insert(call("a"), Expression::parameter("n"));
        assert_eq!(f.get(&call("a")), Some(&Expression::parameter("n")));
    }

    #[test]
    fn test_insert_overwrites_existing_key() {
        let mut f = Formula::new();
        f.insert(call("a"), Expression::constant(1));
        f.insert(call("a"), Expression::constant(2));
        assert_eq!(f.len(), 1);
        assert_eq!(f.get(&call("a")), Some(&Expression::constant(2)));
    }

    #[test]
    fn test_is_recursive() {
        let mut f = Formula::new();
        f.insert(call("a"), Expression::sum(vec![call("a"), Expression::constant(1)]));
        assert!(f.is_recursive("a"));
        assert!(f.depends_on("a", "a"));
    }

    #[test]
    fn test_dependencies_transitive() {
        let mut f = Formula::new();
        f.insert(call("a"), call("b"));
        f.insert(call("b"), call("c"));
        f.insert(call("c"), Expression::constant(1));
        let deps = f.dependencies("a");
        assert!(deps.contains("b"));
        assert!(deps.contains("c"));
    }

    #[test]
    fn test_resolve_into_substitutes_non_self_calls() {
        let mut f = Formula::new();
        f.insert(call("b"), Expression::sum(vec![Expression::parameter("n"), Expression::constant(1)]));
        let target = Expression::sum(vec![call("a"), call("b")]);
        let resolved = f.resolve_into("b", &target);
        assert_eq!(
            resolved,
            Expression::sum(vec![
                call("a"),
                Expression::sum(vec![Expression::parameter("n"), Expression::constant(1)])
            ])
        );
    }

    #[test]
    fn test_resolve_into_skips_self_reference() {
        let mut f = Formula::new();
        let body = Expression::sum(vec![call("a"), Expression::constant(1)]);
        f.insert(call("a"), body.clone());
        let resolved = f.resolve_into("a", &body);
        assert_eq!(resolved, body);
    }

    #[test]
    fn test_is_recursive_detects_mutual_recursion() {
        let mut f = Formula::new();
        f.insert(call("a"), call("b"));
        f.insert(call("b"), Expression::sum(vec![call("a"), Expression::constant(1)]));
        assert!(f.is_recursive("a"));
        assert!(f.is_recursive("b"));
        assert!(!f.depends_on("a", "a")); // direct check alone would miss this
    }

    #[test]
    fn test_collect_entries_reachability() {
        let mut f = Formula::new();
        f.insert(call("a"), call("b"));
        f.insert(call("b"), Expression::constant(1));
        f.insert(call("c"), Expression::constant(2)); // unreachable from a
        let reachable = f.collect_entries("a");
        assert!(reachable.get(&call("a")).is_some());
        assert!(reachable.get(&call("b")).is_some());
        assert!(reachable.get(&call("c")).is_none());
    }

    #[test]
    fn test_get_num_initial_terms_needed() {
        let mut f = Formula::new();
        f.insert(
            call("a"),
            Expression::sum(vec![
                Expression::call("a", vec![Expression::constant(0)]),
                Expression::call("a", vec![Expression::constant(1)]),
            ]),
        );
        assert_eq!(f.get_num_initial_terms_needed("a"), 2);
        assert_eq!(f.get_num_initial_terms_needed("nope"), 0);
    }

    #[test]
    fn test_contains_function_def() {
        let mut f = Formula::new();
        f.insert(call("a"), Expression::constant(1));
        assert!(f.contains_function_def("a"));
        assert!(!f.contains_function_def("b"));
    }

    #[test]
    fn test_remove() {
        let mut f = Formula::new();
        f.insert(call("a"), Expression::constant(1));
        f.remove(&call("a"));
        assert!(f.get(&call("a")).is_none());
        assert!(f.is_empty());
    }

    #[test]
    fn test_rename() {
        let mut f = Formula::new();
        f.insert(call("f1"), Expression::sum(vec![call("f1"), Expression::constant(1)]));
        f.rename("f1", "b");
        assert!(f.get(&call("b")).is_some());
        assert!(f.get(&call("f1")).is_none());
    }
}
