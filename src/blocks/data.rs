//! Variable and list blocks.
//!
//! Lookups go through the running figure first and fall back to the stage.
//! Actions report a missing variable or list as a [`RuntimeError`]; reporters
//! log it and read as a default.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{error, warn};
use rand::Rng;

use crate::block::{Action, Operand, Predicate, Reporter, ReporterBlock};
use crate::builder::GraphBuilder;
use crate::cancel::CancelScope;
use crate::data::{List, ListRef, Variable, VariableRef};
use crate::error::{BuildError, RegistryError, RuntimeError};
use crate::event::{Handler, Relay, Subscription};
use crate::registry::{BlockSpec, Registries};
use crate::script::Context;
use crate::value::Value;

pub fn register(registries: &mut Registries) -> Result<(), RegistryError> {
  let actions = &mut registries.actions;
  actions.register(&["data_setvariableto", "data_changevariableby"], build_set_variable)?;
  actions.register(&["data_addtolist"], build_add_to_list)?;
  actions.register(&["data_deleteoflist"], build_delete_of_list)?;
  actions.register(&["data_deletealloflist"], build_delete_all_of_list)?;
  actions.register(&["data_insertatlist"], build_insert_at_list)?;
  actions.register(&["data_replaceitemoflist"], build_replace_item_of_list)?;

  let reporters = &mut registries.reporters;
  reporters.register(&["data_variable"], build_variable)?;
  reporters.register(&["data_listcontents"], build_list_contents)?;
  reporters.register(&["data_itemoflist"], build_item_of_list)?;
  reporters.register(&["data_itemnumoflist"], build_item_num_of_list)?;
  reporters.register(&["data_lengthoflist"], build_length_of_list)?;
  reporters.register(&["data_listcontainsitem"], build_list_contains_item)?;
  Ok(())
}

/// A list position after keyword and range resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ListIndex {
  Item(usize),
  All,
  Invalid,
}

/// Resolves a 1-based list index. `last`, `random` and `any` pick an item;
/// `all` is only meaningful where `accept_all` is set. Fractions round down.
pub(crate) fn list_index(index: &Value, len: usize, accept_all: bool) -> ListIndex {
  if let Value::String(keyword) = index {
    match keyword.as_str() {
      "all" if accept_all => return ListIndex::All,
      "last" if len > 0 => return ListIndex::Item(len),
      "random" | "any" if len > 0 => {
        return ListIndex::Item(rand::thread_rng().gen_range(1..=len))
      }
      "last" | "random" | "any" => return ListIndex::Invalid,
      _ => {}
    }
  }
  let index = index.to_number().floor();
  if index < 1. || index > len as f64 {
    ListIndex::Invalid
  } else {
    ListIndex::Item(index as usize)
  }
}

/// A variable read that re-exposes the variable's change event.
#[derive(Debug)]
struct VariableSource {
  variable: VariableRef,
  relay: Relay,
}

impl VariableSource {
  fn new(variable: VariableRef) -> Self {
    Self { variable, relay: Relay::new() }
  }

  fn resolve(&self, ctx: &Context) -> Option<Arc<Variable>> {
    let Some(variable) = ctx.variable(&self.variable) else {
      error!("[{}] variable {} not found", ctx.figure.name, self.variable);
      return None;
    };
    self.relay.forward_from(variable.changed());
    Some(variable)
  }
}

/// A list read that re-exposes the list's change event.
#[derive(Debug)]
struct ListSource {
  list: ListRef,
  relay: Relay,
}

impl ListSource {
  fn new(list: ListRef) -> Self {
    Self { list, relay: Relay::new() }
  }

  fn resolve(&self, ctx: &Context) -> Option<Arc<List>> {
    let Some(list) = ctx.list(&self.list) else {
      error!("[{}] list {} not found", ctx.figure.name, self.list);
      return None;
    };
    self.relay.forward_from(list.changed());
    Some(list)
  }
}

fn variable(ctx: &Context, variable: &VariableRef) -> Result<Arc<Variable>, RuntimeError> {
  ctx.variable(variable).ok_or_else(|| RuntimeError::MissingVariable {
    name: variable.name.clone(),
    id: variable.id.clone(),
  })
}

fn list(ctx: &Context, list: &ListRef) -> Result<Arc<List>, RuntimeError> {
  ctx
    .list(list)
    .ok_or_else(|| RuntimeError::MissingList { name: list.name.clone(), id: list.id.clone() })
}

/// The implicit reporter behind a variable literal.
#[derive(Debug)]
pub struct VariableReporter {
  source: VariableSource,
}

impl VariableReporter {
  pub fn new(variable: VariableRef) -> Self {
    Self { source: VariableSource::new(variable) }
  }
}

fn build_variable(builder: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  let variable = builder.variable_field(spec, "VARIABLE")?;
  Ok(ReporterBlock::Value(Arc::new(VariableReporter::new(variable))))
}

impl Reporter for VariableReporter {
  fn opcode(&self) -> &'static str {
    "data_variable"
  }

  fn report(&self, ctx: &Context) -> Value {
    self.source.resolve(ctx).map(|variable| variable.get()).unwrap_or_default()
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.source.relay.subscribe(handler)
  }
}

/// The implicit reporter behind a list literal: the whole list as one value.
#[derive(Debug)]
pub struct ListContents {
  source: ListSource,
}

impl ListContents {
  pub fn new(list: ListRef) -> Self {
    Self { source: ListSource::new(list) }
  }
}

fn build_list_contents(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<ReporterBlock, BuildError> {
  let list = builder.list_field(spec, "LIST")?;
  Ok(ReporterBlock::Value(Arc::new(ListContents::new(list))))
}

impl Reporter for ListContents {
  fn opcode(&self) -> &'static str {
    "data_listcontents"
  }

  fn report(&self, ctx: &Context) -> Value {
    self.source.resolve(ctx).map(|list| Value::String(list.contents())).unwrap_or_default()
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.source.relay.subscribe(handler)
  }
}

#[derive(Debug)]
struct SetVariable {
  opcode: &'static str,
  variable: VariableRef,
  value: Operand,
}

fn build_set_variable(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(SetVariable {
    opcode: spec.opcode,
    variable: builder.variable_field(spec, "VARIABLE")?,
    value: builder.operand(spec, "VALUE")?,
  }))
}

impl Action for SetVariable {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let variable = variable(ctx, &self.variable)?;
      let value = self.value.evaluate(ctx);
      if self.opcode == "data_changevariableby" {
        // Read then write; a concurrent writer in between is overwritten.
        let current = variable.get().to_number();
        variable.set(Value::Number(current + value.to_number()));
      } else {
        variable.set(value);
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct AddToList {
  list: ListRef,
  item: Operand,
}

fn build_add_to_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(AddToList {
    list: builder.list_field(spec, "LIST")?,
    item: builder.operand(spec, "ITEM")?,
  }))
}

impl Action for AddToList {
  fn opcode(&self) -> &'static str {
    "data_addtolist"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let list = list(ctx, &self.list)?;
      if !list.push(self.item.evaluate(ctx), ctx.config.list_item_limit) {
        warn!("[{}] list {} is full", ctx.figure.name, self.list);
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct DeleteOfList {
  list: ListRef,
  index: Operand,
}

fn build_delete_of_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(DeleteOfList {
    list: builder.list_field(spec, "LIST")?,
    index: builder.operand(spec, "INDEX")?,
  }))
}

impl Action for DeleteOfList {
  fn opcode(&self) -> &'static str {
    "data_deleteoflist"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let list = list(ctx, &self.list)?;
      match list_index(&self.index.evaluate(ctx), list.len(), true) {
        ListIndex::All => list.clear(),
        ListIndex::Item(index) => {
          list.remove(index);
        }
        ListIndex::Invalid => {}
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct DeleteAllOfList {
  list: ListRef,
}

fn build_delete_all_of_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(DeleteAllOfList { list: builder.list_field(spec, "LIST")? }))
}

impl Action for DeleteAllOfList {
  fn opcode(&self) -> &'static str {
    "data_deletealloflist"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      list(ctx, &self.list)?.clear();
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct InsertAtList {
  list: ListRef,
  item: Operand,
  index: Operand,
}

fn build_insert_at_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(InsertAtList {
    list: builder.list_field(spec, "LIST")?,
    item: builder.operand(spec, "ITEM")?,
    index: builder.operand(spec, "INDEX")?,
  }))
}

impl Action for InsertAtList {
  fn opcode(&self) -> &'static str {
    "data_insertatlist"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let list = list(ctx, &self.list)?;
      let item = self.item.evaluate(ctx);
      // One past the end appends.
      if let ListIndex::Item(index) =
        list_index(&self.index.evaluate(ctx), list.len() + 1, false)
      {
        if !list.insert(index, item, ctx.config.list_item_limit) {
          warn!("[{}] cannot insert into list {} at {index}", ctx.figure.name, self.list);
        }
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct ReplaceItemOfList {
  list: ListRef,
  index: Operand,
  item: Operand,
}

fn build_replace_item_of_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(ReplaceItemOfList {
    list: builder.list_field(spec, "LIST")?,
    index: builder.operand(spec, "INDEX")?,
    item: builder.operand(spec, "ITEM")?,
  }))
}

impl Action for ReplaceItemOfList {
  fn opcode(&self) -> &'static str {
    "data_replaceitemoflist"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let list = list(ctx, &self.list)?;
      if let ListIndex::Item(index) = list_index(&self.index.evaluate(ctx), list.len(), false)
      {
        list.replace(index, self.item.evaluate(ctx));
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct ItemOfList {
  source: ListSource,
  index: Operand,
}

fn build_item_of_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(ItemOfList {
    source: ListSource::new(builder.list_field(spec, "LIST")?),
    index: builder.operand(spec, "INDEX")?,
  })))
}

impl Reporter for ItemOfList {
  fn opcode(&self) -> &'static str {
    "data_itemoflist"
  }

  fn report(&self, ctx: &Context) -> Value {
    let Some(list) = self.source.resolve(ctx) else {
      return Value::Empty;
    };
    match list_index(&self.index.evaluate(ctx), list.len(), false) {
      ListIndex::Item(index) => list.get(index).unwrap_or_default(),
      _ => Value::Empty,
    }
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.source.relay.subscribe(handler.clone()).join(self.index.subscribe(handler))
  }
}

#[derive(Debug)]
struct ItemNumOfList {
  source: ListSource,
  item: Operand,
}

fn build_item_num_of_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(ItemNumOfList {
    source: ListSource::new(builder.list_field(spec, "LIST")?),
    item: builder.operand(spec, "ITEM")?,
  })))
}

impl Reporter for ItemNumOfList {
  fn opcode(&self) -> &'static str {
    "data_itemnumoflist"
  }

  /// 1-based position of the first equal item, 0 when absent.
  fn report(&self, ctx: &Context) -> Value {
    let Some(list) = self.source.resolve(ctx) else {
      return Value::Number(0.);
    };
    let item = self.item.evaluate(ctx);
    let position = list.items().iter().position(|other| other.equals(&item));
    Value::Number(position.map_or(0., |index| (index + 1) as f64))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.source.relay.subscribe(handler.clone()).join(self.item.subscribe(handler))
  }
}

#[derive(Debug)]
struct LengthOfList {
  source: ListSource,
}

fn build_length_of_list(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(LengthOfList {
    source: ListSource::new(builder.list_field(spec, "LIST")?),
  })))
}

impl Reporter for LengthOfList {
  fn opcode(&self) -> &'static str {
    "data_lengthoflist"
  }

  fn report(&self, ctx: &Context) -> Value {
    Value::Number(self.source.resolve(ctx).map_or(0., |list| list.len() as f64))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.source.relay.subscribe(handler)
  }
}

#[derive(Debug)]
struct ListContainsItem {
  source: ListSource,
  item: Operand,
}

fn build_list_contains_item(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Predicate(Arc::new(ListContainsItem {
    source: ListSource::new(builder.list_field(spec, "LIST")?),
    item: builder.operand(spec, "ITEM")?,
  })))
}

impl Predicate for ListContainsItem {
  fn opcode(&self) -> &'static str {
    "data_listcontainsitem"
  }

  fn test(&self, ctx: &Context) -> bool {
    let Some(list) = self.source.resolve(ctx) else {
      return false;
    };
    let item = self.item.evaluate(ctx);
    list.items().iter().any(|other| other.equals(&item))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.source.relay.subscribe(handler.clone()).join(self.item.subscribe(handler))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::context;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn list_ref() -> ListRef {
    ListRef { name: "items".into(), id: "list".into() }
  }

  fn counter() -> (Arc<AtomicUsize>, Handler) {
    let count = Arc::new(AtomicUsize::new(0));
    let handler_count = count.clone();
    (count, Arc::new(move || {
      handler_count.fetch_add(1, Ordering::SeqCst);
    }))
  }

  fn constant(value: impl Into<Value>) -> Operand {
    Operand::Constant(value.into())
  }

  #[test]
  fn list_indices() {
    assert_eq!(list_index(&Value::from(2.), 3, false), ListIndex::Item(2));
    assert_eq!(list_index(&Value::from(2.9), 3, false), ListIndex::Item(2));
    assert_eq!(list_index(&Value::from("last"), 3, false), ListIndex::Item(3));
    assert_eq!(list_index(&Value::from("last"), 0, false), ListIndex::Invalid);
    assert_eq!(list_index(&Value::from("all"), 3, true), ListIndex::All);
    assert_eq!(list_index(&Value::from("all"), 3, false), ListIndex::Invalid);
    assert_eq!(list_index(&Value::from(0.), 3, false), ListIndex::Invalid);
    assert_eq!(list_index(&Value::from(4.), 3, false), ListIndex::Invalid);
    assert!(matches!(
      list_index(&Value::from("random"), 3, false),
      ListIndex::Item(1..=3)
    ));
  }

  #[tokio::test]
  async fn change_by_adds_to_the_number() {
    let ctx = context();
    let block = SetVariable {
      opcode: "data_changevariableby",
      variable: VariableRef { name: "n".into(), id: "v1".into() },
      value: constant("2.5"),
    };
    block.execute(&ctx, &CancelScope::new()).await.unwrap();
    block.execute(&ctx, &CancelScope::new()).await.unwrap();
    let n = ctx.figure.variable("v1", "n").unwrap();
    assert_eq!(n.get(), Value::Number(5.));
  }

  #[tokio::test]
  async fn globals_are_found_through_the_stage() {
    let ctx = context();
    let block = SetVariable {
      opcode: "data_setvariableto",
      variable: VariableRef { name: "g".into(), id: "global".into() },
      value: constant("hello"),
    };
    block.execute(&ctx, &CancelScope::new()).await.unwrap();
    let stage = ctx.stage().unwrap();
    assert_eq!(stage.variable("global", "g").unwrap().get(), Value::from("hello"));
  }

  #[tokio::test]
  async fn missing_variables_are_runtime_errors() {
    let ctx = context();
    let block = SetVariable {
      opcode: "data_setvariableto",
      variable: VariableRef { name: "nope".into(), id: "nope".into() },
      value: constant(1.),
    };
    let err = block.execute(&ctx, &CancelScope::new()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::MissingVariable { .. }));
    let reporter = VariableReporter::new(VariableRef { name: "nope".into(), id: "x".into() });
    assert_eq!(reporter.report(&ctx), Value::Empty);
  }

  #[tokio::test]
  async fn list_editing() {
    let ctx = context();
    let scope = CancelScope::new();
    for item in ["a", "b", "c"] {
      AddToList { list: list_ref(), item: constant(item) }.execute(&ctx, &scope).await.unwrap();
    }
    InsertAtList { list: list_ref(), item: constant("d"), index: constant(4.) }
      .execute(&ctx, &scope)
      .await
      .unwrap();
    InsertAtList { list: list_ref(), item: constant("z"), index: constant(9.) }
      .execute(&ctx, &scope)
      .await
      .unwrap();
    ReplaceItemOfList { list: list_ref(), index: constant(1.), item: constant("A") }
      .execute(&ctx, &scope)
      .await
      .unwrap();
    DeleteOfList { list: list_ref(), index: constant("last") }
      .execute(&ctx, &scope)
      .await
      .unwrap();
    let contents = ListContents::new(list_ref());
    assert_eq!(contents.report(&ctx), Value::from("Abc"));

    let item = ItemOfList { source: ListSource::new(list_ref()), index: constant(2.) };
    assert_eq!(item.report(&ctx), Value::from("b"));
    let out_of_range = ItemOfList { source: ListSource::new(list_ref()), index: constant(7.) };
    assert_eq!(out_of_range.report(&ctx), Value::Empty);
    let position = ItemNumOfList { source: ListSource::new(list_ref()), item: constant("C") };
    assert_eq!(position.report(&ctx), Value::Number(0.));
    let contains = ListContainsItem { source: ListSource::new(list_ref()), item: constant("c") };
    assert!(contains.test(&ctx));

    DeleteOfList { list: list_ref(), index: constant("all") }
      .execute(&ctx, &scope)
      .await
      .unwrap();
    let length = LengthOfList { source: ListSource::new(list_ref()) };
    assert_eq!(length.report(&ctx), Value::Number(0.));
  }

  #[tokio::test]
  async fn lists_stop_growing_at_the_limit() {
    let mut ctx = context();
    let mut config = (*ctx.config).clone();
    config.list_item_limit = 2;
    ctx.config = Arc::new(config);
    let add = AddToList { list: list_ref(), item: constant(1.) };
    for _ in 0..3 {
      add.execute(&ctx, &CancelScope::new()).await.unwrap();
    }
    assert_eq!(ctx.list(&list_ref()).unwrap().len(), 2);
  }

  #[test]
  fn variable_reporters_forward_changes_after_first_read() {
    let ctx = context();
    let reporter = VariableReporter::new(VariableRef { name: "n".into(), id: "v1".into() });
    let (count, handler) = counter();
    let _subscription = reporter.subscribe(handler);
    reporter.report(&ctx);
    reporter.report(&ctx);
    let n = ctx.figure.variable("v1", "n").unwrap();
    assert_eq!(n.changed().subscriber_count(), 1);
    n.set(Value::from(3.));
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }
}
