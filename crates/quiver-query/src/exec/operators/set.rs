//! The SET and REMOVE operators.
//!
//! All of them switch their target to the NEW view before mutating, skip
//! Null targets (optional-match safety) and convert storage's
//! deleted-record failures into runtime errors.

use quiver_core::{LabelId, PropertyId};
use quiver_storage::{DbAccessor, StorageError, View};

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, expect_vertex, BoxedCursor, Cursor};
use crate::expr::{evaluate, Expression, GraphView};
use crate::frame::Frame;
use crate::plan::SetPropertiesOp;
use crate::symbols::Symbol;
use crate::value::TypedValue;

fn deleted_to_runtime(err: StorageError, what: &str) -> QueryError {
    match err {
        StorageError::RecordDeleted(_) => {
            QueryError::Runtime(format!("trying to {what} on a deleted graph element"))
        }
        other => other.into(),
    }
}

/// `SET obj.key = value`.
pub struct SetPropertyCursor {
    object: Expression,
    key: PropertyId,
    value: Expression,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl SetPropertyCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        object: Expression,
        key: PropertyId,
        value: Expression,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { object, key, value, input, dba }
    }
}

impl Cursor for SetPropertyCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let target = evaluate(&self.object, frame, &ctx.parameters, &self.dba, GraphView::New)?;
        let value = evaluate(&self.value, frame, &ctx.parameters, &self.dba, GraphView::New)?;
        match target {
            TypedValue::Vertex(vertex) => {
                let vertex = vertex.with_view(View::New);
                vertex
                    .set_property(self.key, value.to_property()?)
                    .map_err(|e| deleted_to_runtime(e, "set properties"))?;
            }
            TypedValue::Edge(edge) => {
                let edge = edge.with_view(View::New);
                edge.set_property(self.key, value.to_property()?)
                    .map_err(|e| deleted_to_runtime(e, "set properties"))?;
            }
            // Optional-match safety.
            TypedValue::Null => {}
            other => {
                return Err(QueryError::Runtime(format!(
                    "properties can only be set on vertices and edges, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

/// `SET obj = map` / `SET obj += map`; the source may also be a vertex or
/// edge, whose property map is copied.
pub struct SetPropertiesCursor {
    input_symbol: Symbol,
    value: Expression,
    op: SetPropertiesOp,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl SetPropertiesCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        input_symbol: Symbol,
        value: Expression,
        op: SetPropertiesOp,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { input_symbol, value, op, input, dba }
    }

    /// The `(key, value)` pairs the source expression provides.
    fn source_properties(
        &self,
        value: TypedValue,
    ) -> QueryResult<Vec<(PropertyId, quiver_core::PropertyValue)>> {
        match value {
            TypedValue::Vertex(v) => {
                Ok(v.with_view(View::New).properties()?.into_iter().collect())
            }
            TypedValue::Edge(e) => Ok(e.with_view(View::New).properties()?.into_iter().collect()),
            TypedValue::Map(map) => map
                .into_iter()
                .map(|(name, value)| {
                    Ok((self.dba.registry().property(&name)?, value.to_property()?))
                })
                .collect(),
            other => Err(QueryError::Runtime(format!(
                "can only set vertices, edges and maps as properties, got {}",
                other.type_name()
            ))),
        }
    }

    fn apply(
        &self,
        clear: impl FnOnce() -> Result<(), StorageError>,
        set: impl Fn(PropertyId, quiver_core::PropertyValue) -> Result<(), StorageError>,
        pairs: Vec<(PropertyId, quiver_core::PropertyValue)>,
    ) -> QueryResult<()> {
        if self.op == SetPropertiesOp::Replace {
            clear().map_err(|e| deleted_to_runtime(e, "set properties"))?;
        }
        for (key, value) in pairs {
            set(key, value).map_err(|e| deleted_to_runtime(e, "set properties"))?;
        }
        Ok(())
    }
}

impl Cursor for SetPropertiesCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let target = frame.get(&self.input_symbol).clone();
        let source = evaluate(&self.value, frame, &ctx.parameters, &self.dba, GraphView::New)?;
        match target {
            TypedValue::Vertex(vertex) => {
                let vertex = vertex.with_view(View::New);
                let pairs = self.source_properties(source)?;
                self.apply(
                    || vertex.clear_properties(),
                    |key, value| vertex.set_property(key, value),
                    pairs,
                )?;
            }
            TypedValue::Edge(edge) => {
                let edge = edge.with_view(View::New);
                let pairs = self.source_properties(source)?;
                self.apply(
                    || edge.clear_properties(),
                    |key, value| edge.set_property(key, value),
                    pairs,
                )?;
            }
            TypedValue::Null => {}
            other => {
                return Err(QueryError::Runtime(format!(
                    "properties can only be set on vertices and edges, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

/// Adds labels to a vertex.
pub struct SetLabelsCursor {
    input_symbol: Symbol,
    labels: Vec<LabelId>,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl SetLabelsCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        input_symbol: Symbol,
        labels: Vec<LabelId>,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { input_symbol, labels, input, dba }
    }
}

impl Cursor for SetLabelsCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        check_abort(&self.dba)?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let value = frame.get(&self.input_symbol).clone();
        if value.is_null() {
            return Ok(true);
        }
        let vertex = expect_vertex(&value, &self.input_symbol)?.with_view(View::New);
        for &label in &self.labels {
            vertex.add_label(label).map_err(|e| deleted_to_runtime(e, "set labels"))?;
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

/// `REMOVE obj.key`.
pub struct RemovePropertyCursor {
    object: Expression,
    key: PropertyId,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl RemovePropertyCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(object: Expression, key: PropertyId, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self { object, key, input, dba }
    }
}

impl Cursor for RemovePropertyCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let target = evaluate(&self.object, frame, &ctx.parameters, &self.dba, GraphView::New)?;
        match target {
            TypedValue::Vertex(vertex) => {
                vertex
                    .with_view(View::New)
                    .remove_property(self.key)
                    .map_err(|e| deleted_to_runtime(e, "remove properties"))?;
            }
            TypedValue::Edge(edge) => {
                edge.with_view(View::New)
                    .remove_property(self.key)
                    .map_err(|e| deleted_to_runtime(e, "remove properties"))?;
            }
            TypedValue::Null => {}
            other => {
                return Err(QueryError::Runtime(format!(
                    "properties can only be removed on vertices and edges, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

/// Removes labels from a vertex.
pub struct RemoveLabelsCursor {
    input_symbol: Symbol,
    labels: Vec<LabelId>,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl RemoveLabelsCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        input_symbol: Symbol,
        labels: Vec<LabelId>,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { input_symbol, labels, input, dba }
    }
}

impl Cursor for RemoveLabelsCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        check_abort(&self.dba)?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let value = frame.get(&self.input_symbol).clone();
        if value.is_null() {
            return Ok(true);
        }
        let vertex = expect_vertex(&value, &self.input_symbol)?.with_view(View::New);
        for &label in &self.labels {
            vertex.remove_label(label).map_err(|e| deleted_to_runtime(e, "remove labels"))?;
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolType;
    use quiver_core::{NameRegistry, PropertyValue, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    struct Preloaded {
        done: bool,
        symbol: Symbol,
        value: TypedValue,
    }

    impl Cursor for Preloaded {
        fn pull(&mut self, frame: &mut Frame, _ctx: &mut ExecutionContext) -> QueryResult<bool> {
            if self.done {
                return Ok(false);
            }
            self.done = true;
            frame.set(&self.symbol, self.value.clone());
            Ok(true)
        }

        fn reset(&mut self) -> QueryResult<()> {
            self.done = false;
            Ok(())
        }
    }

    fn preloaded(symbol: &Symbol, value: TypedValue) -> BoxedCursor {
        Box::new(Preloaded { done: false, symbol: symbol.clone(), value })
    }

    #[test]
    fn set_property_on_vertex() {
        let dba = dba();
        let key = dba.registry().property("p").unwrap();
        let vertex = dba.insert_vertex().unwrap();

        let mut table = crate::symbols::SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut cursor = SetPropertyCursor::new(
            Expression::ident(n.clone()),
            key,
            Expression::int(5),
            preloaded(&n, TypedValue::Vertex(vertex.clone())),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        assert_eq!(vertex.property(key).unwrap(), PropertyValue::Int(5));
    }

    #[test]
    fn set_properties_replace_clears_first() {
        let dba = dba();
        let old_key = dba.registry().property("old").unwrap();
        let new_key = dba.registry().property("new").unwrap();
        let vertex = dba.insert_vertex().unwrap();
        vertex.set_property(old_key, PropertyValue::Int(1)).unwrap();

        let mut map = BTreeMap::new();
        map.insert("new".to_owned(), Expression::int(2));

        let mut table = crate::symbols::SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut cursor = SetPropertiesCursor::new(
            n.clone(),
            Expression::MapLiteral(map),
            SetPropertiesOp::Replace,
            preloaded(&n, TypedValue::Vertex(vertex.clone())),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        assert_eq!(vertex.property(old_key).unwrap(), PropertyValue::Null);
        assert_eq!(vertex.property(new_key).unwrap(), PropertyValue::Int(2));
    }

    #[test]
    fn set_properties_update_merges() {
        let dba = dba();
        let old_key = dba.registry().property("old").unwrap();
        let new_key = dba.registry().property("new").unwrap();
        let vertex = dba.insert_vertex().unwrap();
        vertex.set_property(old_key, PropertyValue::Int(1)).unwrap();

        let mut map = BTreeMap::new();
        map.insert("new".to_owned(), Expression::int(2));

        let mut table = crate::symbols::SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut cursor = SetPropertiesCursor::new(
            n.clone(),
            Expression::MapLiteral(map),
            SetPropertiesOp::Update,
            preloaded(&n, TypedValue::Vertex(vertex.clone())),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        assert_eq!(vertex.property(old_key).unwrap(), PropertyValue::Int(1));
        assert_eq!(vertex.property(new_key).unwrap(), PropertyValue::Int(2));
    }

    #[test]
    fn null_targets_are_no_ops() {
        let dba = dba();
        let key = dba.registry().property("p").unwrap();
        let label = dba.registry().label("L").unwrap();

        let mut table = crate::symbols::SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();

        let mut set = SetPropertyCursor::new(
            Expression::ident(n.clone()),
            key,
            Expression::int(5),
            preloaded(&n, TypedValue::Null),
            dba.clone(),
        );
        assert!(set.pull(&mut frame, &mut ctx).unwrap());

        let mut labels = SetLabelsCursor::new(
            n.clone(),
            vec![label],
            preloaded(&n, TypedValue::Null),
            dba,
        );
        assert!(labels.pull(&mut frame, &mut ctx).unwrap());
    }

    #[test]
    fn set_labels_and_remove_labels() {
        let dba = dba();
        let label = dba.registry().label("L").unwrap();
        let vertex = dba.insert_vertex().unwrap();

        let mut table = crate::symbols::SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();

        let mut set = SetLabelsCursor::new(
            n.clone(),
            vec![label],
            preloaded(&n, TypedValue::Vertex(vertex.clone())),
            dba.clone(),
        );
        assert!(set.pull(&mut frame, &mut ctx).unwrap());
        assert!(vertex.has_label(label).unwrap());

        let mut remove = RemoveLabelsCursor::new(
            n.clone(),
            vec![label],
            preloaded(&n, TypedValue::Vertex(vertex.clone())),
            dba,
        );
        assert!(remove.pull(&mut frame, &mut ctx).unwrap());
        assert!(!vertex.has_label(label).unwrap());
    }

    #[test]
    fn set_on_scalar_is_a_runtime_error() {
        let dba = dba();
        let key = dba.registry().property("p").unwrap();

        let mut table = crate::symbols::SymbolTable::new();
        let n = table.create("n", SymbolType::Any, true);
        let mut cursor = SetPropertyCursor::new(
            Expression::ident(n.clone()),
            key,
            Expression::int(5),
            preloaded(&n, TypedValue::Int(3)),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(matches!(cursor.pull(&mut frame, &mut ctx), Err(QueryError::Runtime(_))));
    }
}
