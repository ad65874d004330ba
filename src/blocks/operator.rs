use std::cmp::Ordering;
use std::sync::Arc;

use rand::Rng;

use super::round_half_up;
use crate::block::{Condition, Operand, Predicate, Reporter, ReporterBlock};
use crate::builder::GraphBuilder;
use crate::error::{BuildError, RegistryError};
use crate::event::{Handler, Subscription};
use crate::registry::{BlockSpec, Registries};
use crate::script::Context;
use crate::value::Value;

pub fn register(registries: &mut Registries) -> Result<(), RegistryError> {
  let reporters = &mut registries.reporters;
  reporters.register(
    &["operator_add", "operator_subtract", "operator_multiply", "operator_divide", "operator_mod"],
    build_arithmetic,
  )?;
  reporters.register(&["operator_round"], build_round)?;
  reporters.register(&["operator_mathop"], build_mathop)?;
  reporters.register(&["operator_gt", "operator_lt", "operator_equals"], build_comparison)?;
  reporters.register(&["operator_and", "operator_or"], build_logic)?;
  reporters.register(&["operator_not"], build_not)?;
  reporters.register(&["operator_random"], build_random)?;
  reporters.register(&["operator_join"], build_join)?;
  reporters.register(&["operator_length"], build_length)?;
  reporters.register(&["operator_contains"], build_contains)?;
  reporters.register(&["operator_letter_of"], build_letter_of)?;
  Ok(())
}

/// One subscription covering every operand.
fn subscribe_all(operands: &[&Operand], handler: Handler) -> Subscription {
  operands.iter().fold(Subscription::empty(), |subscription, operand| {
    subscription.join(operand.subscribe(handler.clone()))
  })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithmeticOp {
  Add,
  Subtract,
  Multiply,
  Divide,
  Modulo,
}

impl ArithmeticOp {
  fn apply(self, lhs: f64, rhs: f64) -> f64 {
    match self {
      ArithmeticOp::Add => lhs + rhs,
      ArithmeticOp::Subtract => lhs - rhs,
      ArithmeticOp::Multiply => lhs * rhs,
      ArithmeticOp::Divide => lhs / rhs,
      // The result takes the sign of the divisor.
      ArithmeticOp::Modulo => {
        let mut result = lhs % rhs;
        if result / rhs < 0. {
          result += rhs;
        }
        result
      }
    }
  }
}

#[derive(Debug)]
struct Arithmetic {
  opcode: &'static str,
  op: ArithmeticOp,
  lhs: Operand,
  rhs: Operand,
}

fn build_arithmetic(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  let op = match spec.opcode {
    "operator_add" => ArithmeticOp::Add,
    "operator_subtract" => ArithmeticOp::Subtract,
    "operator_multiply" => ArithmeticOp::Multiply,
    "operator_divide" => ArithmeticOp::Divide,
    _ => ArithmeticOp::Modulo,
  };
  Ok(ReporterBlock::Value(Arc::new(Arithmetic {
    opcode: spec.opcode,
    op,
    lhs: builder.operand(spec, "NUM1")?,
    rhs: builder.operand(spec, "NUM2")?,
  })))
}

impl Reporter for Arithmetic {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn report(&self, ctx: &Context) -> Value {
    let lhs = self.lhs.evaluate(ctx).to_number();
    let rhs = self.rhs.evaluate(ctx).to_number();
    Value::Number(self.op.apply(lhs, rhs))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    subscribe_all(&[&self.lhs, &self.rhs], handler)
  }
}

#[derive(Debug)]
struct Round {
  number: Operand,
}

fn build_round(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(Round { number: builder.operand(spec, "NUM")? })))
}

impl Reporter for Round {
  fn opcode(&self) -> &'static str {
    "operator_round"
  }

  fn report(&self, ctx: &Context) -> Value {
    Value::Number(round_half_up(self.number.evaluate(ctx).to_number()))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.number.subscribe(handler)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MathFunction {
  Abs,
  Floor,
  Ceiling,
  Sqrt,
  Sin,
  Cos,
  Tan,
  Asin,
  Acos,
  Atan,
  Ln,
  Log,
  Exp,
  Pow10,
}

impl MathFunction {
  fn parse(name: &str) -> Option<Self> {
    Some(match name {
      "abs" => MathFunction::Abs,
      "floor" => MathFunction::Floor,
      "ceiling" => MathFunction::Ceiling,
      "sqrt" => MathFunction::Sqrt,
      "sin" => MathFunction::Sin,
      "cos" => MathFunction::Cos,
      "tan" => MathFunction::Tan,
      "asin" => MathFunction::Asin,
      "acos" => MathFunction::Acos,
      "atan" => MathFunction::Atan,
      "ln" => MathFunction::Ln,
      "log" => MathFunction::Log,
      "e ^" => MathFunction::Exp,
      "10 ^" => MathFunction::Pow10,
      _ => return None,
    })
  }

  /// Trigonometry works in degrees.
  fn apply(self, value: f64) -> f64 {
    match self {
      MathFunction::Abs => value.abs(),
      MathFunction::Floor => value.floor(),
      MathFunction::Ceiling => value.ceil(),
      MathFunction::Sqrt => value.sqrt(),
      MathFunction::Sin => ten_places(value.to_radians().sin()),
      MathFunction::Cos => ten_places(value.to_radians().cos()),
      MathFunction::Tan => {
        let angle = value % 360.;
        if angle == -270. || angle == 90. {
          f64::INFINITY
        } else if angle == -90. || angle == 270. {
          f64::NEG_INFINITY
        } else {
          ten_places(angle.to_radians().tan())
        }
      }
      MathFunction::Asin => value.asin().to_degrees(),
      MathFunction::Acos => value.acos().to_degrees(),
      MathFunction::Atan => value.atan().to_degrees(),
      MathFunction::Ln => value.ln(),
      MathFunction::Log => value.log10(),
      MathFunction::Exp => value.exp(),
      MathFunction::Pow10 => 10f64.powf(value),
    }
  }
}

/// Rounds to ten decimal places so `sin 180` reads as 0.
fn ten_places(value: f64) -> f64 {
  (value * 1e10).round() / 1e10
}

#[derive(Debug)]
struct MathOp {
  function: MathFunction,
  number: Operand,
}

fn build_mathop(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  let field = builder.field(spec, "OPERATOR")?;
  let function =
    MathFunction::parse(&field.value).ok_or_else(|| BuildError::UnsupportedField {
      id: spec.id.to_string(),
      field: "OPERATOR",
      value: field.value.clone(),
    })?;
  Ok(ReporterBlock::Value(Arc::new(MathOp { function, number: builder.operand(spec, "NUM")? })))
}

impl Reporter for MathOp {
  fn opcode(&self) -> &'static str {
    "operator_mathop"
  }

  fn report(&self, ctx: &Context) -> Value {
    Value::Number(self.function.apply(self.number.evaluate(ctx).to_number()))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.number.subscribe(handler)
  }
}

#[derive(Debug)]
struct Comparison {
  opcode: &'static str,
  lhs: Operand,
  rhs: Operand,
}

fn build_comparison(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Predicate(Arc::new(Comparison {
    opcode: spec.opcode,
    lhs: builder.operand(spec, "OPERAND1")?,
    rhs: builder.operand(spec, "OPERAND2")?,
  })))
}

impl Predicate for Comparison {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn test(&self, ctx: &Context) -> bool {
    let lhs = self.lhs.evaluate(ctx);
    let rhs = self.rhs.evaluate(ctx);
    match self.opcode {
      "operator_gt" => lhs.compare(&rhs) == Ordering::Greater,
      "operator_lt" => lhs.compare(&rhs) == Ordering::Less,
      _ => lhs.equals(&rhs),
    }
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    subscribe_all(&[&self.lhs, &self.rhs], handler)
  }
}

#[derive(Debug)]
struct Logic {
  opcode: &'static str,
  lhs: Condition,
  rhs: Condition,
}

fn build_logic(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Predicate(Arc::new(Logic {
    opcode: spec.opcode,
    lhs: builder.condition(spec, "OPERAND1")?,
    rhs: builder.condition(spec, "OPERAND2")?,
  })))
}

impl Predicate for Logic {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn test(&self, ctx: &Context) -> bool {
    match self.opcode {
      "operator_and" => self.lhs.test(ctx) && self.rhs.test(ctx),
      _ => self.lhs.test(ctx) || self.rhs.test(ctx),
    }
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.lhs.subscribe(handler.clone()).join(self.rhs.subscribe(handler))
  }
}

#[derive(Debug)]
struct Not {
  operand: Condition,
}

fn build_not(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Predicate(Arc::new(Not { operand: builder.condition(spec, "OPERAND")? })))
}

impl Predicate for Not {
  fn opcode(&self) -> &'static str {
    "operator_not"
  }

  fn test(&self, ctx: &Context) -> bool {
    !self.operand.test(ctx)
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.operand.subscribe(handler)
  }
}

#[derive(Debug)]
struct Random {
  from: Operand,
  to: Operand,
}

fn build_random(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(Random {
    from: builder.operand(spec, "FROM")?,
    to: builder.operand(spec, "TO")?,
  })))
}

/// Whole bounds pick a whole number; otherwise any number in between.
fn pick_random(from: &Value, to: &Value) -> f64 {
  let (a, b) = (from.to_number(), to.to_number());
  let (low, high) = if a <= b { (a, b) } else { (b, a) };
  if low == high || !(low.is_finite() && high.is_finite()) {
    return low;
  }
  let mut rng = rand::thread_rng();
  if from.is_int() && to.is_int() && low >= i64::MIN as f64 && high <= i64::MAX as f64 {
    rng.gen_range(low as i64..=high as i64) as f64
  } else {
    // Interpolated, since `high - low` may overflow to infinity.
    let t: f64 = rng.gen();
    (low * (1. - t) + high * t).clamp(low, high)
  }
}

impl Reporter for Random {
  fn opcode(&self) -> &'static str {
    "operator_random"
  }

  fn report(&self, ctx: &Context) -> Value {
    Value::Number(pick_random(&self.from.evaluate(ctx), &self.to.evaluate(ctx)))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    subscribe_all(&[&self.from, &self.to], handler)
  }
}

#[derive(Debug)]
struct Join {
  first: Operand,
  second: Operand,
}

fn build_join(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(Join {
    first: builder.operand(spec, "STRING1")?,
    second: builder.operand(spec, "STRING2")?,
  })))
}

impl Reporter for Join {
  fn opcode(&self) -> &'static str {
    "operator_join"
  }

  fn report(&self, ctx: &Context) -> Value {
    Value::String(format!("{}{}", self.first.evaluate(ctx), self.second.evaluate(ctx)))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    subscribe_all(&[&self.first, &self.second], handler)
  }
}

#[derive(Debug)]
struct Length {
  string: Operand,
}

fn build_length(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(Length { string: builder.operand(spec, "STRING")? })))
}

impl Reporter for Length {
  fn opcode(&self) -> &'static str {
    "operator_length"
  }

  fn report(&self, ctx: &Context) -> Value {
    Value::Number(self.string.evaluate(ctx).to_string().chars().count() as f64)
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.string.subscribe(handler)
  }
}

#[derive(Debug)]
struct Contains {
  haystack: Operand,
  needle: Operand,
}

fn build_contains(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Predicate(Arc::new(Contains {
    haystack: builder.operand(spec, "STRING1")?,
    needle: builder.operand(spec, "STRING2")?,
  })))
}

impl Predicate for Contains {
  fn opcode(&self) -> &'static str {
    "operator_contains"
  }

  fn test(&self, ctx: &Context) -> bool {
    let haystack = self.haystack.evaluate(ctx).to_string().to_lowercase();
    let needle = self.needle.evaluate(ctx).to_string().to_lowercase();
    haystack.contains(&needle)
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    subscribe_all(&[&self.haystack, &self.needle], handler)
  }
}

#[derive(Debug)]
struct LetterOf {
  letter: Operand,
  string: Operand,
}

fn build_letter_of(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(LetterOf {
    letter: builder.operand(spec, "LETTER")?,
    string: builder.operand(spec, "STRING")?,
  })))
}

impl Reporter for LetterOf {
  fn opcode(&self) -> &'static str {
    "operator_letter_of"
  }

  /// The 1-based character, or "" when out of range.
  fn report(&self, ctx: &Context) -> Value {
    let index = self.letter.evaluate(ctx).to_number() - 1.;
    let string = self.string.evaluate(ctx).to_string();
    if index < 0. {
      return Value::from("");
    }
    let letter = string.chars().nth(index as usize).map(String::from).unwrap_or_default();
    Value::String(letter)
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    subscribe_all(&[&self.letter, &self.string], handler)
  }
}
