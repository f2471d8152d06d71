//! Small symbolic algebra over real-valued expressions.
//!
//! Expressions are kept in a canonical form by their constructors: sums and
//! products are flattened, numeric parts are folded, like terms and equal
//! bases are combined, and operands are ordered by their printed form. That
//! makes structural equality behave like sympy's `==` for the common cases.
//! Identity checks (`simplify(a - b) == 0`) are decided numerically at a
//! fixed set of sample points instead of by rewriting.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Sample values for identity checks. Mixed signs so branch-sensitive
/// identities (`sqrt(x**2) == x`) are not accepted.
const SAMPLE_POINTS: [f64; 12] = [
    0.739_085_133_2,
    -1.324_717_957_2,
    2.236_067_977_5,
    -0.577_215_664_9,
    1.618_033_988_7,
    -2.645_751_311_1,
    0.318_309_886_2,
    -0.841_470_984_8,
    1.259_921_049_9,
    -3.316_624_790_4,
    2.704_312_000_1,
    -0.414_213_562_4,
];
const MIN_VALID_SAMPLES: usize = 3;
const IDENTITY_TOLERANCE: f64 = 1e-8;
const MAX_EXPANDED_TERMS: usize = 4096;
const MAX_EXPANDED_POWER: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub fn value(self) -> f64 {
        match self {
            Constant::Pi => std::f64::consts::PI,
            Constant::E => std::f64::consts::E,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Constant::Pi => "pi",
            Constant::E => "E",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Abs,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Asin => "asin",
            Func::Acos => "acos",
            Func::Atan => "atan",
            Func::Sinh => "sinh",
            Func::Cosh => "cosh",
            Func::Tanh => "tanh",
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Abs => "Abs",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Asin => x.asin(),
            Func::Acos => x.acos(),
            Func::Atan => x.atan(),
            Func::Sinh => x.sinh(),
            Func::Cosh => x.cosh(),
            Func::Tanh => x.tanh(),
            Func::Exp => x.exp(),
            Func::Log => {
                if x > 0.0 {
                    x.ln()
                } else {
                    f64::NAN
                }
            }
            Func::Abs => x.abs(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Symbolic {
    Num(f64),
    Sym(String),
    Const(Constant),
    Add(Vec<Symbolic>),
    Mul(Vec<Symbolic>),
    Pow(Box<Symbolic>, Box<Symbolic>),
    Func(Func, Box<Symbolic>),
}

use Symbolic::{Add, Const, Mul, Num, Pow, Sym};

pub fn approx_eq(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn is_one(v: f64) -> bool {
    (v - 1.0).abs() <= 1e-14
}

fn is_integer(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0
}

impl Symbolic {
    pub fn num(value: f64) -> Self {
        Num(value)
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Sym(name.into())
    }

    pub fn add(terms: Vec<Symbolic>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Add(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        let mut constant = 0.0;
        let mut constant_scale = 0.0_f64;
        let mut groups: BTreeMap<String, (Symbolic, f64, f64)> = BTreeMap::new();
        for term in flat {
            if let Num(value) = term {
                constant += value;
                constant_scale = constant_scale.max(value.abs());
                continue;
            }
            let (coeff, rest) = term.split_coefficient();
            let entry = groups
                .entry(rest.to_string())
                .or_insert_with(|| (rest, 0.0, 0.0));
            entry.1 += coeff;
            entry.2 = entry.2.max(coeff.abs());
        }
        let mut kept: Vec<(String, Symbolic, f64)> = groups
            .into_iter()
            .filter(|(_, (_, coeff, scale))| !negligible(*coeff, *scale))
            .map(|(key, (rest, coeff, _))| (key, rest, coeff))
            .collect();
        // Higher degree first, then by printed form.
        kept.sort_by(|(ka, a, _), (kb, b, _)| {
            degree(b)
                .partial_cmp(&degree(a))
                .unwrap_or(Ordering::Equal)
                .then_with(|| ka.cmp(kb))
        });
        let mut out: Vec<Symbolic> = kept
            .into_iter()
            .map(|(_, rest, coeff)| Symbolic::scaled(coeff, rest))
            .collect();
        if !negligible(constant, constant_scale) {
            out.push(Num(constant));
        }
        match out.len() {
            0 => Num(0.0),
            1 => out.remove(0),
            _ => Add(out),
        }
    }

    pub fn mul(factors: Vec<Symbolic>) -> Self {
        let mut flat = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor {
                Mul(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        let mut coeff = 1.0;
        let mut groups: BTreeMap<String, (Symbolic, Vec<Symbolic>)> = BTreeMap::new();
        for factor in flat {
            let (base, exponent) = match factor {
                Num(value) => {
                    coeff *= value;
                    continue;
                }
                Pow(base, exponent) => (*base, *exponent),
                other => (other, Num(1.0)),
            };
            groups
                .entry(base.to_string())
                .or_insert_with(|| (base, Vec::new()))
                .1
                .push(exponent);
        }
        if coeff == 0.0 {
            return Num(0.0);
        }
        let mut out = Vec::with_capacity(groups.len());
        let mut regroup = false;
        for (base, exponents) in groups.into_values() {
            match Symbolic::pow(base, Symbolic::add(exponents)) {
                Num(value) => coeff *= value,
                Mul(inner) => {
                    regroup = true;
                    out.extend(inner);
                }
                other => out.push(other),
            }
        }
        if regroup {
            out.push(Num(coeff));
            return Symbolic::mul(out);
        }
        if coeff == 0.0 {
            return Num(0.0);
        }
        if out.is_empty() {
            return Num(coeff);
        }
        if out.len() == 1 && !is_one(coeff) {
            if let Add(terms) = &out[0] {
                return Symbolic::add(
                    terms
                        .iter()
                        .map(|t| Symbolic::mul(vec![Num(coeff), t.clone()]))
                        .collect(),
                );
            }
        }
        if is_one(coeff) {
            if out.len() == 1 {
                return out.remove(0);
            }
        } else {
            out.insert(0, Num(coeff));
        }
        Mul(out)
    }

    pub fn pow(base: Symbolic, exponent: Symbolic) -> Self {
        if let Num(e) = exponent {
            if e == 0.0 {
                return Num(1.0);
            }
            if is_one(e) {
                return base;
            }
        }
        if let Num(b) = base
            && is_one(b)
        {
            return Num(1.0);
        }
        match (base, exponent) {
            (Num(b), Num(e)) => {
                let value = b.powf(e);
                if value.is_finite() && (b >= 0.0 || is_integer(e)) {
                    Num(value)
                } else {
                    Pow(Box::new(Num(b)), Box::new(Num(e)))
                }
            }
            (Const(Constant::E), e) => Symbolic::func(Func::Exp, e),
            (Symbolic::Func(Func::Exp, arg), e) => {
                Symbolic::func(Func::Exp, Symbolic::mul(vec![*arg, e]))
            }
            (Pow(b, inner), Num(n)) if is_integer(n) => {
                Symbolic::pow(*b, Symbolic::mul(vec![*inner, Num(n)]))
            }
            (Mul(factors), Num(n)) if is_integer(n) => Symbolic::mul(
                factors
                    .into_iter()
                    .map(|f| Symbolic::pow(f, Num(n)))
                    .collect(),
            ),
            (b, e) => Pow(Box::new(b), Box::new(e)),
        }
    }

    pub fn func(func: Func, arg: Symbolic) -> Self {
        match (func, &arg) {
            (Func::Exp, Num(v)) if *v == 0.0 => return Num(1.0),
            (Func::Exp, Num(v)) if is_one(*v) => return Const(Constant::E),
            (Func::Exp, Symbolic::Func(Func::Log, inner)) => return (**inner).clone(),
            (Func::Log, Symbolic::Func(Func::Exp, inner)) => return (**inner).clone(),
            (Func::Log, Const(Constant::E)) => return Num(1.0),
            (Func::Log, Num(v)) if is_one(*v) => return Num(0.0),
            (Func::Abs, Symbolic::Func(Func::Abs, inner)) => {
                return Symbolic::Func(Func::Abs, inner.clone());
            }
            _ => {}
        }
        if arg.is_constant() {
            let value = func.apply(arg.eval_constant());
            if value.is_finite() {
                return Num(value);
            }
        }
        Symbolic::Func(func, Box::new(arg))
    }

    pub fn neg(value: Symbolic) -> Self {
        Symbolic::mul(vec![Num(-1.0), value])
    }

    pub fn sub(lhs: Symbolic, rhs: Symbolic) -> Self {
        Symbolic::add(vec![lhs, Symbolic::neg(rhs)])
    }

    pub fn div(lhs: Symbolic, rhs: Symbolic) -> Self {
        Symbolic::mul(vec![lhs, Symbolic::pow(rhs, Num(-1.0))])
    }

    fn scaled(coeff: f64, rest: Symbolic) -> Self {
        if is_one(coeff) {
            rest
        } else {
            Symbolic::mul(vec![Num(coeff), rest])
        }
    }

    fn split_coefficient(self) -> (f64, Symbolic) {
        match self {
            Mul(mut factors) if matches!(factors.first(), Some(Num(_))) => {
                let coeff = match factors.remove(0) {
                    Num(c) => c,
                    _ => 1.0,
                };
                let rest = if factors.len() == 1 {
                    factors.remove(0)
                } else {
                    Mul(factors)
                };
                (coeff, rest)
            }
            other => (1.0, other),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Num(value) => Some(*value),
            _ => None,
        }
    }

    /// True when no free symbol occurs.
    pub fn is_constant(&self) -> bool {
        match self {
            Num(_) | Const(_) => true,
            Sym(_) => false,
            Add(items) | Mul(items) => items.iter().all(Symbolic::is_constant),
            Pow(base, exponent) => base.is_constant() && exponent.is_constant(),
            Symbolic::Func(_, arg) => arg.is_constant(),
        }
    }

    pub fn eval_constant(&self) -> f64 {
        self.eval(&BTreeMap::new())
    }

    /// Numeric value with symbols bound from `env`; NaN when unbound or undefined.
    pub fn eval(&self, env: &BTreeMap<String, f64>) -> f64 {
        match self {
            Num(value) => *value,
            Sym(name) => env.get(name).copied().unwrap_or(f64::NAN),
            Const(c) => c.value(),
            Add(terms) => terms.iter().map(|t| t.eval(env)).sum(),
            Mul(factors) => factors.iter().map(|f| f.eval(env)).product(),
            Pow(base, exponent) => base.eval(env).powf(exponent.eval(env)),
            Symbolic::Func(func, arg) => func.apply(arg.eval(env)),
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Num(_) | Const(_) => {}
            Sym(name) => {
                out.insert(name.clone());
            }
            Add(items) | Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Pow(base, exponent) => {
                base.collect_symbols(out);
                exponent.collect_symbols(out);
            }
            Symbolic::Func(_, arg) => arg.collect_symbols(out),
        }
    }

    pub fn depends_on(&self, var: &str) -> bool {
        match self {
            Num(_) | Const(_) => false,
            Sym(name) => name == var,
            Add(items) | Mul(items) => items.iter().any(|i| i.depends_on(var)),
            Pow(base, exponent) => base.depends_on(var) || exponent.depends_on(var),
            Symbolic::Func(_, arg) => arg.depends_on(var),
        }
    }

    /// Replace every occurrence of `old` with `new`, re-canonicalizing.
    pub fn subs(&self, old: &Symbolic, new: &Symbolic) -> Symbolic {
        if structurally_equal(self, old) {
            return new.clone();
        }
        match self {
            Num(_) | Sym(_) | Const(_) => self.clone(),
            Add(terms) => Symbolic::add(terms.iter().map(|t| t.subs(old, new)).collect()),
            Mul(factors) => Symbolic::mul(factors.iter().map(|f| f.subs(old, new)).collect()),
            Pow(base, exponent) => Symbolic::pow(base.subs(old, new), exponent.subs(old, new)),
            Symbolic::Func(func, arg) => Symbolic::func(*func, arg.subs(old, new)),
        }
    }

    pub fn diff(&self, var: &str) -> Symbolic {
        if !self.depends_on(var) {
            return Num(0.0);
        }
        match self {
            Num(_) | Const(_) => Num(0.0),
            Sym(name) => Num(if name == var { 1.0 } else { 0.0 }),
            Add(terms) => Symbolic::add(terms.iter().map(|t| t.diff(var)).collect()),
            Mul(factors) => Symbolic::add(
                (0..factors.len())
                    .map(|i| {
                        let mut product = factors.clone();
                        product[i] = factors[i].diff(var);
                        Symbolic::mul(product)
                    })
                    .collect(),
            ),
            Pow(base, exponent) => {
                let b = (**base).clone();
                let e = (**exponent).clone();
                if !e.depends_on(var) {
                    Symbolic::mul(vec![
                        e.clone(),
                        Symbolic::pow(b.clone(), Symbolic::sub(e, Num(1.0))),
                        b.diff(var),
                    ])
                } else if !b.depends_on(var) {
                    Symbolic::mul(vec![
                        self.clone(),
                        Symbolic::func(Func::Log, b),
                        e.diff(var),
                    ])
                } else {
                    Symbolic::mul(vec![
                        self.clone(),
                        Symbolic::add(vec![
                            Symbolic::mul(vec![e.diff(var), Symbolic::func(Func::Log, b.clone())]),
                            Symbolic::mul(vec![e, b.diff(var), Symbolic::pow(b, Num(-1.0))]),
                        ]),
                    ])
                }
            }
            Symbolic::Func(func, arg) => {
                let u = (**arg).clone();
                let outer = match func {
                    Func::Sin => Symbolic::func(Func::Cos, u.clone()),
                    Func::Cos => Symbolic::neg(Symbolic::func(Func::Sin, u.clone())),
                    Func::Tan => Symbolic::add(vec![
                        Num(1.0),
                        Symbolic::pow(Symbolic::func(Func::Tan, u.clone()), Num(2.0)),
                    ]),
                    Func::Asin => Symbolic::pow(one_minus_square(&u), Num(-0.5)),
                    Func::Acos => Symbolic::neg(Symbolic::pow(one_minus_square(&u), Num(-0.5))),
                    Func::Atan => Symbolic::pow(
                        Symbolic::add(vec![Num(1.0), Symbolic::pow(u.clone(), Num(2.0))]),
                        Num(-1.0),
                    ),
                    Func::Sinh => Symbolic::func(Func::Cosh, u.clone()),
                    Func::Cosh => Symbolic::func(Func::Sinh, u.clone()),
                    Func::Tanh => Symbolic::sub(
                        Num(1.0),
                        Symbolic::pow(Symbolic::func(Func::Tanh, u.clone()), Num(2.0)),
                    ),
                    Func::Exp => self.clone(),
                    Func::Log => Symbolic::pow(u.clone(), Num(-1.0)),
                    Func::Abs => Symbolic::div(u.clone(), self.clone()),
                };
                Symbolic::mul(vec![outer, u.diff(var)])
            }
        }
    }

    /// Antiderivative for sums of scaled elementary terms with linear arguments.
    pub fn integrate(&self, var: &str) -> Result<Symbolic, String> {
        if !self.depends_on(var) {
            return Ok(Symbolic::mul(vec![self.clone(), Symbolic::symbol(var)]));
        }
        let unsupported = || format!("cannot integrate {self} with respect to {var}");
        match self {
            Add(terms) => Ok(Symbolic::add(
                terms
                    .iter()
                    .map(|t| t.integrate(var))
                    .collect::<Result<_, _>>()?,
            )),
            Mul(factors) => {
                let (dependent, constant): (Vec<_>, Vec<_>) =
                    factors.iter().cloned().partition(|f| f.depends_on(var));
                if !constant.is_empty() {
                    let mut out = constant;
                    out.push(Symbolic::mul(dependent).integrate(var)?);
                    return Ok(Symbolic::mul(out));
                }
                let expanded = self.expand();
                if !structurally_equal(&expanded, self) {
                    return expanded.integrate(var);
                }
                Err(unsupported())
            }
            Sym(_) => Ok(Symbolic::mul(vec![
                Num(0.5),
                Symbolic::pow(self.clone(), Num(2.0)),
            ])),
            Pow(base, exponent) => {
                if !exponent.depends_on(var) {
                    let slope = linear_slope(base, var).ok_or_else(unsupported)?;
                    if let Num(e) = **exponent
                        && approx_eq(e, -1.0)
                    {
                        return Ok(Symbolic::div(
                            Symbolic::func(Func::Log, (**base).clone()),
                            slope,
                        ));
                    }
                    let raised = Symbolic::add(vec![(**exponent).clone(), Num(1.0)]);
                    return Ok(Symbolic::div(
                        Symbolic::pow((**base).clone(), raised.clone()),
                        Symbolic::mul(vec![raised, slope]),
                    ));
                }
                if !base.depends_on(var) {
                    let slope = linear_slope(exponent, var).ok_or_else(unsupported)?;
                    return Ok(Symbolic::div(
                        self.clone(),
                        Symbolic::mul(vec![slope, Symbolic::func(Func::Log, (**base).clone())]),
                    ));
                }
                let expanded = self.expand();
                if !structurally_equal(&expanded, self) {
                    return expanded.integrate(var);
                }
                Err(unsupported())
            }
            Symbolic::Func(func, arg) => {
                let slope = linear_slope(arg, var).ok_or_else(unsupported)?;
                let u = (**arg).clone();
                let antiderivative = match func {
                    Func::Sin => Symbolic::neg(Symbolic::func(Func::Cos, u)),
                    Func::Cos => Symbolic::func(Func::Sin, u),
                    Func::Exp => self.clone(),
                    Func::Sinh => Symbolic::func(Func::Cosh, u),
                    Func::Cosh => Symbolic::func(Func::Sinh, u),
                    Func::Tan => {
                        Symbolic::neg(Symbolic::func(Func::Log, Symbolic::func(Func::Cos, u)))
                    }
                    Func::Log => Symbolic::sub(
                        Symbolic::mul(vec![u.clone(), Symbolic::func(Func::Log, u.clone())]),
                        u,
                    ),
                    _ => return Err(unsupported()),
                };
                Ok(Symbolic::div(antiderivative, slope))
            }
            Num(_) | Const(_) => Ok(Symbolic::mul(vec![self.clone(), Symbolic::symbol(var)])),
        }
    }

    /// Distribute products over sums and expand small integer powers of sums.
    pub fn expand(&self) -> Symbolic {
        match self {
            Add(terms) => Symbolic::add(terms.iter().map(Symbolic::expand).collect()),
            Mul(factors) => factors
                .iter()
                .map(Symbolic::expand)
                .fold(Num(1.0), |acc, f| distribute(&acc, &f)),
            Pow(base, exponent) => {
                let base = base.expand();
                if let Num(n) = **exponent
                    && is_integer(n)
                    && (2.0..=MAX_EXPANDED_POWER).contains(&n)
                    && matches!(base, Add(_))
                {
                    let mut acc = base.clone();
                    for _ in 1..(n as usize) {
                        acc = distribute(&acc, &base);
                    }
                    return acc;
                }
                Symbolic::pow(base, exponent.expand())
            }
            Symbolic::Func(func, arg) => Symbolic::func(*func, arg.expand()),
            Num(_) | Sym(_) | Const(_) => self.clone(),
        }
    }

    /// Numeric identity check; `None` when too few sample points are defined.
    pub fn is_identically_zero(&self) -> Option<bool> {
        if let Num(value) = self {
            return Some(approx_eq(*value, 0.0));
        }
        let symbols = self.free_symbols();
        if symbols.is_empty() {
            let value = self.eval_constant();
            return value.is_finite().then(|| approx_eq(value, 0.0));
        }
        let mut valid = 0;
        for k in 0..SAMPLE_POINTS.len() {
            let env = sample_env(&symbols, k);
            let value = self.eval(&env);
            if !value.is_finite() {
                continue;
            }
            let scale = self.magnitude(&env).max(1.0);
            if value.abs() > IDENTITY_TOLERANCE * scale {
                return Some(false);
            }
            valid += 1;
        }
        (valid >= MIN_VALID_SAMPLES).then_some(true)
    }

    /// Value of the expression when it does not vary with its symbols.
    fn sampled_constant(&self) -> Option<f64> {
        let symbols = self.free_symbols();
        if symbols.is_empty() {
            let value = self.eval_constant();
            return value.is_finite().then_some(value);
        }
        let mut seen: Option<f64> = None;
        let mut valid = 0;
        for k in 0..SAMPLE_POINTS.len() {
            let value = self.eval(&sample_env(&symbols, k));
            if !value.is_finite() {
                continue;
            }
            match seen {
                None => seen = Some(value),
                Some(first) => {
                    let scale = first.abs().max(value.abs()).max(1.0);
                    if (value - first).abs() > IDENTITY_TOLERANCE * scale {
                        return None;
                    }
                }
            }
            valid += 1;
        }
        if valid < MIN_VALID_SAMPLES {
            return None;
        }
        seen
    }

    fn magnitude(&self, env: &BTreeMap<String, f64>) -> f64 {
        match self {
            Add(terms) => terms.iter().map(|t| t.eval(env).abs()).sum(),
            _ => self.eval(env).abs(),
        }
    }

    /// Collapse identities to their constant value, otherwise prefer the
    /// shorter of the expression and its expansion.
    pub fn simplify(&self) -> Symbolic {
        if matches!(self, Num(_) | Const(_) | Sym(_)) {
            return self.clone();
        }
        if let Some(value) = self.sampled_constant() {
            return Num(round_significant(value, 12));
        }
        let expanded = self.expand();
        if expanded.to_string().len() < self.to_string().len() {
            expanded
        } else {
            self.clone()
        }
    }

    fn negated_display(&self) -> Option<String> {
        match self {
            Num(value) if *value < 0.0 => Some(fmt_num(-*value)),
            Mul(factors) => match factors.first() {
                Some(Num(coeff)) if *coeff < 0.0 => Some(fmt_mul(-*coeff, &factors[1..])),
                _ => None,
            },
            _ => None,
        }
    }
}

fn negligible(value: f64, scale: f64) -> bool {
    value == 0.0 || value.abs() <= 1e-12 * scale
}

/// Polynomial degree used for term ordering; non-polynomial parts count as 0.
fn degree(expr: &Symbolic) -> f64 {
    match expr {
        Sym(_) => 1.0,
        Pow(base, exponent) => match (&**base, &**exponent) {
            (Sym(_), Num(e)) => *e,
            _ => 0.0,
        },
        Mul(factors) => factors.iter().map(degree).sum(),
        _ => 0.0,
    }
}

fn one_minus_square(u: &Symbolic) -> Symbolic {
    Symbolic::sub(Num(1.0), Symbolic::pow(u.clone(), Num(2.0)))
}

/// Derivative of `expr` when it is a non-constant linear function of `var`.
fn linear_slope(expr: &Symbolic, var: &str) -> Option<Symbolic> {
    let slope = expr.diff(var);
    if slope.depends_on(var) || matches!(slope, Num(v) if v == 0.0) {
        return None;
    }
    Some(slope)
}

fn terms_of(expr: &Symbolic) -> Vec<Symbolic> {
    match expr {
        Add(terms) => terms.clone(),
        other => vec![other.clone()],
    }
}

fn distribute(lhs: &Symbolic, rhs: &Symbolic) -> Symbolic {
    let left = terms_of(lhs);
    let right = terms_of(rhs);
    if left.len() * right.len() > MAX_EXPANDED_TERMS {
        return Symbolic::mul(vec![lhs.clone(), rhs.clone()]);
    }
    Symbolic::add(
        left.iter()
            .flat_map(|a| {
                right
                    .iter()
                    .map(move |b| Symbolic::mul(vec![a.clone(), b.clone()]))
            })
            .collect(),
    )
}

fn sample_env(symbols: &BTreeSet<String>, k: usize) -> BTreeMap<String, f64> {
    symbols
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let point = SAMPLE_POINTS[(k + 5 * i) % SAMPLE_POINTS.len()];
            (name.clone(), point * (1.0 + 0.137 * i as f64))
        })
        .collect()
}

/// Round to `significant` digits, snapping values near zero to zero.
pub fn round_significant(value: f64, significant: i32) -> f64 {
    if value.abs() < 1e-10 {
        return 0.0;
    }
    let digits = significant - value.abs().log10().ceil() as i32;
    if !(0..=300).contains(&digits) {
        return value;
    }
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

fn structurally_equal(a: &Symbolic, b: &Symbolic) -> bool {
    match (a, b) {
        (Num(x), Num(y)) => approx_eq(*x, *y),
        (Sym(x), Sym(y)) => x == y,
        (Const(x), Const(y)) => x == y,
        (Add(xs), Add(ys)) | (Mul(xs), Mul(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| structurally_equal(x, y))
        }
        (Pow(b1, e1), Pow(b2, e2)) => structurally_equal(b1, b2) && structurally_equal(e1, e2),
        (Symbolic::Func(f1, a1), Symbolic::Func(f2, a2)) => f1 == f2 && structurally_equal(a1, a2),
        _ => false,
    }
}

/// Structural equality of canonical forms; constant expressions compare by value.
impl PartialEq for Symbolic {
    fn eq(&self, other: &Self) -> bool {
        structurally_equal(self, other)
            || (self.is_constant()
                && other.is_constant()
                && approx_eq(self.eval_constant(), other.eval_constant()))
    }
}

pub fn fmt_num(value: f64) -> String {
    if is_integer(value) && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn needs_parens_as_factor(expr: &Symbolic) -> bool {
    matches!(expr, Add(_))
}

fn needs_parens_as_base(expr: &Symbolic) -> bool {
    match expr {
        Add(_) | Mul(_) | Pow(..) => true,
        Num(v) => *v < 0.0 || !is_integer(*v),
        _ => false,
    }
}

fn fmt_factor(expr: &Symbolic) -> String {
    if needs_parens_as_factor(expr) {
        format!("({expr})")
    } else {
        expr.to_string()
    }
}

fn fmt_base(expr: &Symbolic) -> String {
    if needs_parens_as_base(expr) {
        format!("({expr})")
    } else {
        expr.to_string()
    }
}

fn fmt_pow(base: &Symbolic, exponent: &Symbolic) -> String {
    match exponent {
        Num(e) if approx_eq(*e, 0.5) => format!("sqrt({base})"),
        Num(e) if *e < 0.0 => format!("1/{}", fmt_pow(base, &Num(-*e))),
        Num(e) if is_one(*e) => fmt_base(base),
        Num(_) | Sym(_) | Const(_) => format!("{}**{exponent}", fmt_base(base)),
        _ => format!("{}**({exponent})", fmt_base(base)),
    }
}

fn fmt_mul(coeff: f64, factors: &[Symbolic]) -> String {
    let mut numerator = Vec::new();
    let mut denominator = Vec::new();
    for factor in factors {
        match factor {
            Pow(base, exponent) if matches!(**exponent, Num(e) if e < 0.0) => {
                let positive = match **exponent {
                    Num(e) => -e,
                    _ => 1.0,
                };
                denominator.push(fmt_pow(base, &Num(positive)));
            }
            other => numerator.push(fmt_factor(other)),
        }
    }
    let mut prefix = "";
    if approx_eq(coeff, -1.0) && !numerator.is_empty() {
        prefix = "-";
    } else if !is_one(coeff) {
        numerator.insert(0, fmt_num(coeff));
    }
    let mut out = String::from(prefix);
    if numerator.is_empty() {
        out.push('1');
    } else {
        out.push_str(&numerator.join("*"));
    }
    match denominator.len() {
        0 => {}
        1 => {
            out.push('/');
            out.push_str(&denominator[0]);
        }
        _ => {
            out.push_str("/(");
            out.push_str(&denominator.join("*"));
            out.push(')');
        }
    }
    out
}

impl fmt::Display for Symbolic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num(value) => f.write_str(&fmt_num(*value)),
            Sym(name) => f.write_str(name),
            Const(c) => f.write_str(c.name()),
            Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    match (i, term.negated_display()) {
                        (0, Some(magnitude)) => write!(f, "-{magnitude}")?,
                        (0, None) => write!(f, "{term}")?,
                        (_, Some(magnitude)) => write!(f, " - {magnitude}")?,
                        (_, None) => write!(f, " + {term}")?,
                    }
                }
                Ok(())
            }
            Mul(factors) => match factors.first() {
                Some(Num(coeff)) => f.write_str(&fmt_mul(*coeff, &factors[1..])),
                _ => f.write_str(&fmt_mul(1.0, factors)),
            },
            Pow(base, exponent) => f.write_str(&fmt_pow(base, exponent)),
            Symbolic::Func(func, arg) => write!(f, "{}({arg})", func.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An unresolved relation such as `Eq(f(x), 0)` or `x < 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub op: RelOp,
    pub lhs: Symbolic,
    pub rhs: Symbolic,
}

impl Relation {
    /// Build a relation, resolving it at once when both sides decide it.
    pub fn build(op: RelOp, lhs: Symbolic, rhs: Symbolic) -> Result<bool, Relation> {
        match op {
            RelOp::Eq | RelOp::Ne => {
                if lhs == rhs {
                    return Ok(op == RelOp::Eq);
                }
                if lhs.is_constant() && rhs.is_constant() {
                    return Ok(op == RelOp::Ne);
                }
            }
            RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge => {
                if lhs.is_constant() && rhs.is_constant() {
                    let (a, b) = (lhs.eval_constant(), rhs.eval_constant());
                    if a.is_finite() && b.is_finite() {
                        return Ok(compare(op, a, b));
                    }
                }
            }
        }
        Err(Relation { op, lhs, rhs })
    }

    /// Decide the relation using identity checks on `lhs - rhs`.
    pub fn decide(&self) -> Option<bool> {
        let difference = Symbolic::sub(self.lhs.clone(), self.rhs.clone());
        match self.op {
            RelOp::Eq => match difference.is_identically_zero() {
                Some(true) => Some(true),
                _ if difference.is_constant() => Some(false),
                _ => None,
            },
            RelOp::Ne => match difference.is_identically_zero() {
                Some(true) => Some(false),
                _ if difference.is_constant() => Some(true),
                _ => None,
            },
            op => {
                if !difference.is_constant() {
                    return None;
                }
                let value = difference.eval_constant();
                value.is_finite().then(|| compare(op, value, 0.0))
            }
        }
    }

    pub fn simplify(&self) -> Result<bool, Relation> {
        match self.decide() {
            Some(verdict) => Ok(verdict),
            None => Err(Relation {
                op: self.op,
                lhs: self.lhs.simplify(),
                rhs: self.rhs.simplify(),
            }),
        }
    }

    pub fn subs(&self, old: &Symbolic, new: &Symbolic) -> Result<bool, Relation> {
        Relation::build(self.op, self.lhs.subs(old, new), self.rhs.subs(old, new))
    }
}

fn compare(op: RelOp, a: f64, b: f64) -> bool {
    match op {
        RelOp::Eq => approx_eq(a, b),
        RelOp::Ne => !approx_eq(a, b),
        RelOp::Lt => a < b,
        RelOp::Le => a <= b,
        RelOp::Gt => a > b,
        RelOp::Ge => a >= b,
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self.op {
            RelOp::Eq => return write!(f, "Eq({}, {})", self.lhs, self.rhs),
            RelOp::Ne => return write!(f, "Ne({}, {})", self.lhs, self.rhs),
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        };
        write!(f, "{} {symbol} {}", self.lhs, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Symbolic {
        Symbolic::symbol("x")
    }

    fn y() -> Symbolic {
        Symbolic::symbol("y")
    }

    #[test]
    fn like_terms_combine_and_cancel() {
        let expr = Symbolic::add(vec![x(), x(), Symbolic::neg(Symbolic::mul(vec![Num(2.0), x()]))]);
        assert_eq!(expr, Num(0.0));
        let doubled = Symbolic::add(vec![x(), x()]);
        assert_eq!(doubled.to_string(), "2*x");
    }

    #[test]
    fn canonical_order_makes_products_commute() {
        let a = Symbolic::mul(vec![x(), y(), Num(3.0)]);
        let b = Symbolic::mul(vec![Num(3.0), y(), x()]);
        assert_eq!(a, b);
        assert_eq!(Symbolic::mul(vec![x(), x()]).to_string(), "x**2");
    }

    #[test]
    fn display_reads_like_sympy() {
        let expr = Symbolic::add(vec![
            Symbolic::pow(x(), Num(2.0)),
            Symbolic::mul(vec![Num(-3.0), x()]),
            Num(1.0),
        ]);
        assert_eq!(expr.to_string(), "x**2 - 3*x + 1");
        assert_eq!(Symbolic::pow(x(), Num(0.5)).to_string(), "sqrt(x)");
        assert_eq!(Symbolic::div(Num(1.0), x()).to_string(), "1/x");
    }

    #[test]
    fn derivative_of_polynomial_and_chain_rule() {
        let cubic = Symbolic::pow(x(), Num(3.0));
        assert_eq!(cubic.diff("x"), Symbolic::mul(vec![Num(3.0), Symbolic::pow(x(), Num(2.0))]));

        let wave = Symbolic::func(Func::Sin, Symbolic::mul(vec![Num(2.0), x()]));
        let expected = Symbolic::mul(vec![
            Num(2.0),
            Symbolic::func(Func::Cos, Symbolic::mul(vec![Num(2.0), x()])),
        ]);
        assert_eq!(wave.diff("x"), expected);
    }

    #[test]
    fn integrate_polynomial_and_exponential() {
        let integrand = Symbolic::add(vec![Symbolic::mul(vec![Num(3.0), Symbolic::pow(x(), Num(2.0))]), Num(1.0)]);
        let integral = integrand.integrate("x").expect("integrable");
        assert_eq!(integral, Symbolic::add(vec![Symbolic::pow(x(), Num(3.0)), x()]));

        let growth = Symbolic::func(Func::Exp, Symbolic::mul(vec![Num(2.0), x()]));
        let integral = growth.integrate("x").expect("integrable");
        assert_eq!(integral.diff("x"), growth);
    }

    #[test]
    fn integrate_reports_unsupported_forms() {
        let product = Symbolic::mul(vec![x(), Symbolic::func(Func::Exp, x())]);
        assert!(product.integrate("x").is_err());
    }

    #[test]
    fn expand_distributes_and_powers() {
        let square = Symbolic::pow(Symbolic::add(vec![x(), Num(1.0)]), Num(2.0));
        let expected = Symbolic::add(vec![
            Symbolic::pow(x(), Num(2.0)),
            Symbolic::mul(vec![Num(2.0), x()]),
            Num(1.0),
        ]);
        assert_eq!(square.expand(), expected);
    }

    #[test]
    fn identities_are_detected_numerically() {
        let pythagoras = Symbolic::add(vec![
            Symbolic::pow(Symbolic::func(Func::Sin, x()), Num(2.0)),
            Symbolic::pow(Symbolic::func(Func::Cos, x()), Num(2.0)),
        ]);
        assert_eq!(pythagoras.simplify(), Num(1.0));

        let not_identity = Symbolic::sub(Symbolic::pow(Symbolic::pow(x(), Num(2.0)), Num(0.5)), x());
        assert_eq!(not_identity.is_identically_zero(), Some(false));
    }

    #[test]
    fn relations_resolve_when_decidable() {
        assert_eq!(Relation::build(RelOp::Eq, x(), x()), Ok(true));
        assert_eq!(Relation::build(RelOp::Lt, Num(1.0), Num(2.0)), Ok(true));
        let pending = Relation::build(RelOp::Eq, Symbolic::pow(x(), Num(2.0)), Num(4.0))
            .expect_err("depends on x");
        assert!(pending.decide().is_none());
        assert_eq!(pending.to_string(), "Eq(x**2, 4)");

        let identity = Relation::build(
            RelOp::Eq,
            Symbolic::pow(Symbolic::add(vec![x(), Num(1.0)]), Num(2.0)),
            Symbolic::add(vec![Symbolic::pow(x(), Num(2.0)), Symbolic::mul(vec![Num(2.0), x()]), Num(1.0)]),
        )
        .expect_err("not structurally equal");
        assert_eq!(identity.simplify(), Ok(true));
    }

    #[test]
    fn exp_and_log_cancel() {
        let expr = Symbolic::func(Func::Exp, Symbolic::func(Func::Log, x()));
        assert_eq!(expr, x());
        assert_eq!(Symbolic::func(Func::Exp, Num(1.0)), Symbolic::Const(Constant::E));
    }
}
