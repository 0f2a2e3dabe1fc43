use std::collections::BTreeSet;

use loda_number::Number;

/// A symbolic arithmetic expression over one free parameter (conventionally
/// named `n`) and zero or more named function calls.
///
/// `Sum`/`Product` are n-ary and flatten under normalization; the other
/// binary operators stay binary because the operations that build them
/// (`sub`, `div`, `pow`, `mod`) are themselves binary and nothing downstream
/// needs to associate more than two operands at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(Number),
    Parameter(String),
    /// A named call, e.g. `a(n-1)` or `binomial(n,k)`. Covers every
    /// operator that has no dedicated algebraic rewrite rule of its own
    /// (`gcd`, `min`, `max`, `binomial`, `floor`, `truncate`, and calls into
    /// another sequence's formula).
    Function(String, Vec<Expression>),
    Sum(Vec<Expression>),
    Difference(Box<Expression>, Box<Expression>),
    Product(Vec<Expression>),
    Fraction(Box<Expression>, Box<Expression>),
    Power(Box<Expression>, Box<Expression>),
    Modulus(Box<Expression>, Box<Expression>),
    /// `if param == literal then then_branch else else_branch`, the shape
    /// `convertInitialTermsToIf` builds to fold literal-argument entries
    /// back into the general one.
    If {
        param: Box<Expression>,
        literal: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
}

impl Expression {
    pub fn constant<N: Into<Number>>(n: N) -> Self {
        Expression::Constant(n.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Expression::Parameter(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function(name.into(), args)
    }

    pub fn difference(a: Expression, b: Expression) -> Self {
        Expression::Difference(Box::new(a), Box::new(b))
    }

    pub fn fraction(a: Expression, b: Expression) -> Self {
        Expression::Fraction(Box::new(a), Box::new(b))
    }

    pub fn power(a: Expression, b: Expression) -> Self {
        Expression::Power(Box::new(a), Box::new(b))
    }

    pub fn modulus(a: Expression, b: Expression) -> Self {
        Expression::Modulus(Box::new(a), Box::new(b))
    }

    pub fn sum(mut terms: Vec<Expression>) -> Self {
        if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Expression::Sum(terms)
        }
    }

    pub fn product(mut factors: Vec<Expression>) -> Self {
        if factors.len() == 1 {
            factors.pop().unwrap()
        } else {
            Expression::Product(factors)
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Number> {
        match self {
            Expression::Constant(n) => Some(n),
            _ => None,
        }
    }

    /// Substitutes every occurrence of `Parameter(name)` with `replacement`.
    /// Used to instantiate a formula's body at a call site (`resolve`) and
    /// to build initial terms (`f(n-1)` style seeding).
    pub fn substitute(&self, name: &str, replacement: &Expression) -> Expression {
        match self {
            Expression::Constant(_) => self.clone(),
            Expression::Parameter(p) if p == name => replacement.clone(),
            Expression::Parameter(_) => self.clone(),
            Expression::Function(f, args) => Expression::Function(
                f.clone(),
                args.iter().map(|a| a.substitute(name, replacement)).collect(),
            ),
            Expression::Sum(terms) => {
                Expression::Sum(terms.iter().map(|t| t.substitute(name, replacement)).collect())
            }
            Expression::Product(factors) => Expression::Product(
                factors.iter().map(|t| t.substitute(name, replacement)).collect(),
            ),
            Expression::Difference(a, b) => Expression::difference(
                a.substitute(name, replacement),
                b.substitute(name, replacement),
            ),
            Expression::Fraction(a, b) => {
                Expression::fraction(a.substitute(name, replacement), b.substitute(name, replacement))
            }
            Expression::Power(a, b) => {
                Expression::power(a.substitute(name, replacement), b.substitute(name, replacement))
            }
            Expression::Modulus(a, b) => {
                Expression::modulus(a.substitute(name, replacement), b.substitute(name, replacement))
            }
            Expression::If { param, literal, then_branch, else_branch } => Expression::If {
                param: Box::new(param.substitute(name, replacement)),
                literal: Box::new(literal.substitute(name, replacement)),
                then_branch: Box::new(then_branch.substitute(name, replacement)),
                else_branch: Box::new(else_branch.substitute(name, replacement)),
            },
        }
    }

    /// Renames every call to function `old` into a call to `new`, leaving
    /// argument lists untouched. Used when the generator compacts function
    /// names at the end of a run.
    pub fn rename_function(&self, old: &str, new: &str) -> Expression {
        match self {
            Expression::Function(f, args) => Expression::Function(
                if f == old { new.to_string() } else { f.clone() },
                args.iter().map(|a| a.rename_function(old, new)).collect(),
            ),
            Expression::Sum(terms) => {
                Expression::Sum(terms.iter().map(|t| t.rename_function(old, new)).collect())
            }
            Expression::Product(factors) => {
                Expression::Product(factors.iter().map(|t| t.rename_function(old, new)).collect())
            }
            Expression::Difference(a, b) => {
                Expression::difference(a.rename_function(old, new), b.rename_function(old, new))
            }
            Expression::Fraction(a, b) => {
                Expression::fraction(a.rename_function(old, new), b.rename_function(old, new))
            }
            Expression::Power(a, b) => {
                Expression::power(a.rename_function(old, new), b.rename_function(old, new))
            }
            Expression::Modulus(a, b) => {
                Expression::modulus(a.rename_function(old, new), b.rename_function(old, new))
            }
            Expression::If { param, literal, then_branch, else_branch } => Expression::If {
                param: Box::new(param.rename_function(old, new)),
                literal: Box::new(literal.rename_function(old, new)),
                then_branch: Box::new(then_branch.rename_function(old, new)),
                else_branch: Box::new(else_branch.rename_function(old, new)),
            },
            Expression::Constant(_) | Expression::Parameter(_) => self.clone(),
        }
    }

    /// Every distinct function name called anywhere in this expression.
    pub fn called_functions(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_called_functions(&mut names);
        names
    }

    fn collect_called_functions(&self, out: &mut BTreeSet<String>) {
        match self {
            Expression::Constant(_) | Expression::Parameter(_) => {}
            Expression::Function(f, args) => {
                out.insert(f.clone());
                for a in args {
                    a.collect_called_functions(out);
                }
            }
            Expression::Sum(terms) | Expression::Product(terms) => {
                for t in terms {
                    t.collect_called_functions(out);
                }
            }
            Expression::Difference(a, b)
            | Expression::Fraction(a, b)
            | Expression::Power(a, b)
            | Expression::Modulus(a, b) => {
                a.collect_called_functions(out);
                b.collect_called_functions(out);
            }
            Expression::If { param, literal, then_branch, else_branch } => {
                param.collect_called_functions(out);
                literal.collect_called_functions(out);
                then_branch.collect_called_functions(out);
                else_branch.collect_called_functions(out);
            }
        }
    }

    /// Conservative (may over-report) check for whether this expression can
    /// evaluate to a negative value. Used to decide whether a PARI-dialect
    /// formula needs a `floor`/`truncate` guard around a division, power, or
    /// binomial coefficient — erring toward "can be negative" only costs an
    /// extra wrapper, never a wrong result.
    pub fn can_be_negative(&self) -> bool {
        match self {
            Expression::Constant(n) => !n.is_nonnegative(),
            Expression::Parameter(_) => false,
            Expression::Function(name, args) => match name.as_str() {
                "gcd" => false,
                "binomial" => args.iter().all(|a| !a.can_be_negative()),
                // max(_, 0), the truncated-subtraction shape TRN lowers to.
                "max" => matches!(args.as_slice(), [_, second] if second.as_constant() == Some(&Number::zero())),
                "floor" => args.first().map(|a| !a.can_be_negative()).unwrap_or(true),
                _ => true,
            },
            Expression::Sum(terms) => terms.iter().any(Expression::can_be_negative),
            Expression::Product(factors) => factors.iter().any(Expression::can_be_negative),
            Expression::Difference(..) => true,
            Expression::Fraction(a, b) => a.can_be_negative() || b.can_be_negative(),
            Expression::Power(base, _) => base.can_be_negative(),
            Expression::Modulus(a, _) => a.can_be_negative(),
            Expression::If { then_branch, else_branch, .. } => {
                then_branch.can_be_negative() || else_branch.can_be_negative()
            }
        }
    }

    /// One pass of bottom-up rewriting: normalize children, then apply this
    /// node's local simplification rules.
    fn normalize_once(&self) -> Expression {
        match self {
            Expression::Constant(_) | Expression::Parameter(_) => self.clone(),
            Expression::Function(f, args) => {
                Expression::Function(f.clone(), args.iter().map(Expression::normalize_once).collect())
            }
            Expression::Sum(terms) => normalize_sum(terms),
            Expression::Product(factors) => normalize_product(factors),
            Expression::Difference(a, b) => normalize_difference(a.normalize_once(), b.normalize_once()),
            Expression::Fraction(a, b) => normalize_fraction(a.normalize_once(), b.normalize_once()),
            Expression::Power(a, b) => normalize_power(a.normalize_once(), b.normalize_once()),
            Expression::Modulus(a, b) => normalize_modulus(a.normalize_once(), b.normalize_once()),
            Expression::If { param, literal, then_branch, else_branch } => {
                let param = param.normalize_once();
                let literal = literal.normalize_once();
                let then_branch = then_branch.normalize_once();
                let else_branch = else_branch.normalize_once();
                match (param.as_constant(), literal.as_constant()) {
                    (Some(p), Some(l)) if p == l => then_branch,
                    (Some(_), Some(_)) => else_branch,
                    _ => Expression::If {
                        param: Box::new(param),
                        literal: Box::new(literal),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    },
                }
            }
        }
    }

    /// Rewrites the expression to a canonical fixed point: constants are
    /// folded, `Sum`/`Product` are flattened and sorted, and signs are
    /// pushed onto a single trailing constant term.
    pub fn normalize(&self) -> Expression {
        let mut current = self.normalize_once();
        for _ in 0..64 {
            let next = current.normalize_once();
            if next == current {
                return current;
            }
            current = next;
        }
        current
    }
}

/// The total order over node kinds used to sort commutative children
/// (spec §4.F): `CONSTANT < PARAMETER < FUNCTION(name asc, then children) <`
/// the remaining algebraic node kinds, ordered by kind then children.
fn kind_rank(e: &Expression) -> u8 {
    match e {
        Expression::Constant(_) => 0,
        Expression::Parameter(_) => 1,
        Expression::Function(..) => 2,
        Expression::Sum(_) => 3,
        Expression::Difference(..) => 4,
        Expression::Product(_) => 5,
        Expression::Fraction(..) => 6,
        Expression::Power(..) => 7,
        Expression::Modulus(..) => 8,
        Expression::If { .. } => 9,
    }
}

/// A stable, purely structural sort key honoring the node-kind order above,
/// falling back to a textual comparison of the node's own payload (constant
/// value, parameter/function name) and then its children, so that flattened
/// `Sum`/`Product` terms land in a deterministic order regardless of the
/// order operations were folded in.
fn sort_key(e: &Expression) -> (u8, String, Vec<String>) {
    match e {
        Expression::Constant(n) => (kind_rank(e), n.to_string(), Vec::new()),
        Expression::Parameter(p) => (kind_rank(e), p.clone(), Vec::new()),
        Expression::Function(name, args) => {
            (kind_rank(e), name.clone(), args.iter().map(|a| format!("{:?}", sort_key(a))).collect())
        }
        Expression::Sum(terms) | Expression::Product(terms) => {
            (kind_rank(e), String::new(), terms.iter().map(|a| format!("{:?}", sort_key(a))).collect())
        }
        Expression::Difference(a, b)
        | Expression::Fraction(a, b)
        | Expression::Power(a, b)
        | Expression::Modulus(a, b) => (
            kind_rank(e),
            String::new(),
            vec![format!("{:?}", sort_key(a)), format!("{:?}", sort_key(b))],
        ),
        Expression::If { param, literal, then_branch, else_branch } => (
            kind_rank(e),
            String::new(),
            vec![
                format!("{:?}", sort_key(param)),
                format!("{:?}", sort_key(literal)),
                format!("{:?}", sort_key(then_branch)),
                format!("{:?}", sort_key(else_branch)),
            ],
        ),
    }
}

fn normalize_sum(terms: &[Expression]) -> Expression {
    let mut flat = Vec::new();
    for t in terms {
        let t = t.normalize_once();
        match t {
            Expression::Sum(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    let mut constant_acc = Number::zero();
    let mut rest = Vec::new();
    for t in flat {
        match t {
            Expression::Constant(n) => constant_acc = constant_acc.add(&n),
            Expression::Difference(a, b) if b.as_constant().map(|n| !n.is_nonnegative()).unwrap_or(false) => {
                // a - (-k) normalizes to a + k: fold the now-positive constant in here
                if let Expression::Constant(k) = *b {
                    constant_acc = constant_acc.sub(&k);
                    rest.push(*a);
                } else {
                    unreachable!()
                }
            }
            other => rest.push(other),
        }
    }
    if !constant_acc.is_zero() {
        rest.push(Expression::Constant(constant_acc));
    }
    rest.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    match rest.len() {
        0 => Expression::Constant(Number::zero()),
        1 => rest.pop().unwrap(),
        _ => Expression::Sum(rest),
    }
}

fn normalize_product(factors: &[Expression]) -> Expression {
    let mut flat = Vec::new();
    for f in factors {
        let f = f.normalize_once();
        match f {
            Expression::Product(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    let mut constant_acc = Number::one();
    let mut rest = Vec::new();
    for f in flat {
        match f {
            Expression::Constant(n) => {
                if n.is_zero() {
                    return Expression::Constant(Number::zero());
                }
                constant_acc = constant_acc.mul(&n);
            }
            other => rest.push(other),
        }
    }
    let is_one = constant_acc == Number::one();
    if !is_one {
        rest.push(Expression::Constant(constant_acc));
    }
    rest.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    match rest.len() {
        0 => Expression::Constant(Number::one()),
        1 => rest.pop().unwrap(),
        _ => Expression::Product(rest),
    }
}

fn normalize_difference(a: Expression, b: Expression) -> Expression {
    if let Some(n) = b.as_constant() {
        if n.is_zero() {
            return a;
        }
    }
    if a == b {
        return Expression::Constant(Number::zero());
    }
    if let (Some(x), Some(y)) = (a.as_constant(), b.as_constant()) {
        return Expression::Constant(x.sub(y));
    }
    if let Some(n) = b.as_constant() {
        if !n.is_nonnegative() {
            // a - (-k) -> a + k
            return normalize_sum(&[a, Expression::Constant(Number::zero().sub(n))]);
        }
    }
    Expression::difference(a, b)
}

fn normalize_fraction(a: Expression, b: Expression) -> Expression {
    if let Some(n) = b.as_constant() {
        if n == &Number::one() {
            return a;
        }
    }
    if let Some(n) = a.as_constant() {
        if n.is_zero() {
            if let Some(d) = b.as_constant() {
                if !d.is_zero() {
                    return Expression::Constant(Number::zero());
                }
            }
        }
    }
    if let (Some(x), Some(y)) = (a.as_constant(), b.as_constant()) {
        // Only fold when the division is exact: a non-exact fraction is a
        // PARI-dialect concern (floor vs. truncate) resolved by the caller,
        // not by generic algebraic normalization.
        let quotient = x.div(y);
        if !y.is_zero() && quotient.mul(y) == *x {
            return Expression::Constant(quotient);
        }
    }
    Expression::fraction(a, b)
}

fn normalize_power(a: Expression, b: Expression) -> Expression {
    if let Some(n) = b.as_constant() {
        if n.is_zero() {
            return Expression::Constant(Number::one());
        }
        if n == &Number::one() {
            return a;
        }
    }
    if let (Some(x), Some(y)) = (a.as_constant(), b.as_constant()) {
        if let Ok(exp) = y.as_int() {
            if exp >= 0 {
                return Expression::Constant(x.pow(y));
            }
        }
    }
    Expression::power(a, b)
}

fn normalize_modulus(a: Expression, b: Expression) -> Expression {
    if let Some(n) = b.as_constant() {
        if n == &Number::one() {
            return Expression::Constant(Number::zero());
        }
    }
    if let (Some(x), Some(y)) = (a.as_constant(), b.as_constant()) {
        if !y.is_zero() {
            return Expression::Constant(x.rem(y));
        }
    }
    Expression::modulus(a, b)
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Constant(n) => write!(f, "{n}"),
            Expression::Parameter(p) => write!(f, "{p}"),
            Expression::Function(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expression::Sum(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, "+")?;
                    }
                    write_factor(f, t)?;
                }
                Ok(())
            }
            Expression::Difference(a, b) => {
                write_factor(f, a)?;
                write!(f, "-")?;
                write_factor(f, b)
            }
            Expression::Product(factors) => {
                for (i, t) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write_factor(f, t)?;
                }
                Ok(())
            }
            Expression::Fraction(a, b) => {
                write_factor(f, a)?;
                write!(f, "/")?;
                write_factor(f, b)
            }
            Expression::Power(a, b) => {
                write_factor(f, a)?;
                write!(f, "^")?;
                write_factor(f, b)
            }
            Expression::Modulus(a, b) => {
                write_factor(f, a)?;
                write!(f, "%")?;
                write_factor(f, b)
            }
            Expression::If { param, literal, then_branch, else_branch } => {
                write!(f, "if({param}=={literal},{then_branch},{else_branch})")
            }
        }
    }
}

fn needs_parens(e: &Expression) -> bool {
    matches!(
        e,
        Expression::Sum(_) | Expression::Difference(..) | Expression::If { .. }
    )
}

fn write_factor(f: &mut std::fmt::Formatter<'_>, e: &Expression) -> std::fmt::Result {
    if needs_parens(e) {
        write!(f, "({e})")
    } else {
        write!(f, "{e}")
    }
}
