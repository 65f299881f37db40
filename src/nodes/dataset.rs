//! The array-backed leaf node: a dense buffer with metadata.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::sealed::Sealed;
use super::vertex::{self, DatasetState, VertexInner, VertexKind};
use super::Vertex;
use crate::data::ops::{self, BinaryOp, UnaryOp};
use crate::data::{ArrayData, DataType};
use crate::errors::{Error, Result};
use crate::metadata::{Metadata, Value};

/// A leaf node wrapping one dense buffer. Read-only mode is the
/// writability of the buffer itself.
#[derive(Clone)]
pub struct Dataset(pub(crate) Rc<VertexInner>);

/// Options for creating or requiring a dataset. The buffer is built
/// either from `shape`/`dtype` (zero-initialized) or from explicit
/// `data`; data overrides shape, and a `dtype` given alongside data
/// coerces it.
#[derive(Clone, Debug, Default)]
pub struct DatasetOptions {
    pub(crate) read_only: Option<bool>,
    shape: Option<Vec<usize>>,
    dtype: Option<DataType>,
    data: Option<ArrayData>,
    metadata: IndexMap<String, Value>,
}

impl DatasetOptions {
    pub fn new() -> Self {
        DatasetOptions::default()
    }

    /// Read-only mode of the new dataset; defaults to the mode of the
    /// group it is created in.
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = Some(value);
        self
    }

    pub fn shape(mut self, shape: impl Into<Vec<usize>>) -> Self {
        self.shape = Some(shape.into());
        self
    }

    pub fn dtype(mut self, dtype: DataType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn data(mut self, data: impl Into<ArrayData>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn metadata_map(mut self, entries: IndexMap<String, Value>) -> Self {
        self.metadata.extend(entries);
        self
    }

    pub(crate) fn build_data(&self) -> Result<ArrayData> {
        match &self.data {
            Some(data) => match self.dtype {
                Some(dtype) if dtype != data.dtype() => data.cast(dtype),
                _ => Ok(data.clone()),
            },
            None => ArrayData::zeros(
                self.shape.clone().unwrap_or_else(|| vec![0]),
                self.dtype.unwrap_or(DataType::Float),
            ),
        }
    }

    pub(crate) fn into_metadata(self) -> IndexMap<String, Value> {
        self.metadata
    }
}

impl Dataset {
    pub(crate) fn attach_new(
        parent: &super::Group,
        local_name: &str,
        read_only: bool,
        metadata: IndexMap<String, Value>,
        data: ArrayData,
    ) -> Result<Dataset> {
        let inner = vertex::attach(
            parent,
            local_name,
            read_only,
            metadata,
            VertexKind::Dataset(DatasetState {
                data: RefCell::new(data),
                writable: Cell::new(!read_only),
            }),
        )?;
        Ok(Dataset(inner))
    }

    /// A dataset outside any tree, used for copies and arithmetic
    /// results.
    pub(crate) fn detached_with(
        name: String,
        parent: Option<std::rc::Weak<VertexInner>>,
        read_only: bool,
        metadata: Metadata,
        data: ArrayData,
    ) -> Dataset {
        Dataset(vertex::detached(
            name,
            parent,
            read_only,
            metadata,
            VertexKind::Dataset(DatasetState {
                data: RefCell::new(data),
                writable: Cell::new(!read_only),
            }),
        ))
    }

    /// The wrapped buffer. The returned guard borrows the dataset; clone
    /// the buffer to hold it past other operations.
    pub fn data(&self) -> Ref<'_, ArrayData> {
        self.0.dataset_state().data.borrow()
    }

    pub fn dtype(&self) -> DataType {
        self.data().dtype()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data().shape()
    }

    pub fn ndim(&self) -> usize {
        self.data().ndim()
    }

    /// Total element count.
    pub fn size(&self) -> usize {
        self.data().size()
    }

    /// First-axis length; a 0-dimensional buffer reports 1.
    pub fn len(&self) -> usize {
        self.data().len_outer()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`.
    pub fn get(&self, index: &[usize]) -> Option<Value> {
        self.data().get(index)
    }

    /// Writes the element at `index`; fails when the buffer is frozen.
    pub fn set(&self, index: &[usize], value: impl Into<Value>) -> Result<()> {
        let state = self.0.dataset_state();
        if !state.writable.get() {
            return Err(Error::ReadOnly(self.name()));
        }
        state.data.borrow_mut().set(index, value.into())
    }

    /// A snapshot iterator over the elements in row-major order.
    pub fn iter(&self) -> std::vec::IntoIter<Value> {
        self.data().iter_values().into_iter()
    }

    /// Deep-copies the buffer and metadata, preserving the declared name
    /// and parent pointer. The copy is absent from every index.
    pub fn copy(&self, read_only: Option<bool>) -> Dataset {
        let mode = read_only.unwrap_or_else(|| self.read_only());
        Dataset::detached_with(
            self.0.name.clone(),
            self.0.parent.borrow().clone(),
            mode,
            self.0.metadata.copy(Some(mode)),
            self.data().clone(),
        )
    }

    /// Applies a binary operation element-wise against another dataset.
    /// The result is a new, parentless dataset named after the operation
    /// and operands, carrying the union of both operands' metadata.
    pub fn apply(&self, op: BinaryOp, rhs: &Dataset) -> Result<Dataset> {
        let data = ops::binary(op, &self.data(), &rhs.data())?;
        Ok(self.result_of(op.name(), &rhs.name(), data, Some(&rhs.metadata())))
    }

    /// Applies a binary operation element-wise against a scalar.
    pub fn apply_scalar(&self, op: BinaryOp, rhs: impl Into<Value>) -> Result<Dataset> {
        let value = rhs.into();
        let scalar = scalar_operand(&value)?;
        let data = ops::binary(op, &self.data(), &scalar)?;
        Ok(self.result_of(op.name(), &value.to_string(), data, None))
    }

    /// Applies a unary operation element-wise.
    pub fn apply_unary(&self, op: UnaryOp) -> Result<Dataset> {
        let data = ops::unary(op, &self.data())?;
        let name = format!("{}({})", op.name(), self.name());
        Ok(Dataset::detached_with(
            name.clone(),
            None,
            false,
            Metadata::new(false, name, self.metadata().to_map()),
            data,
        ))
    }

    /// Floored division.
    pub fn floordiv(&self, rhs: &Dataset) -> Result<Dataset> {
        self.apply(BinaryOp::FloorDiv, rhs)
    }

    /// Floored quotient and remainder in one call.
    pub fn divmod(&self, rhs: &Dataset) -> Result<(Dataset, Dataset)> {
        Ok((
            self.apply(BinaryOp::FloorDiv, rhs)?,
            self.apply(BinaryOp::Rem, rhs)?,
        ))
    }

    pub fn pow(&self, rhs: &Dataset) -> Result<Dataset> {
        self.apply(BinaryOp::Pow, rhs)
    }

    /// Matrix multiplication for the 1-D/2-D combinations.
    pub fn matmul(&self, rhs: &Dataset) -> Result<Dataset> {
        self.apply(BinaryOp::MatMul, rhs)
    }

    pub fn abs(&self) -> Result<Dataset> {
        self.apply_unary(UnaryOp::Abs)
    }

    fn result_of(
        &self,
        op_name: &str,
        rhs_label: &str,
        data: ArrayData,
        rhs_metadata: Option<&Metadata>,
    ) -> Dataset {
        let name = format!("{}({},{})", op_name, self.name(), rhs_label);
        // Union of the operand metadata; the left operand wins on
        // conflicting keys.
        let mut merged = self.metadata().to_map();
        if let Some(other) = rhs_metadata {
            for (key, value) in other.to_map() {
                merged.entry(key).or_insert(value);
            }
        }
        Dataset::detached_with(
            name.clone(),
            None,
            false,
            Metadata::new(false, name, merged),
            data,
        )
    }
}

fn scalar_operand(value: &Value) -> Result<ArrayData> {
    match value {
        Value::Bool(v) => Ok(ArrayData::Bool(ndarray::arr0(*v).into_dyn())),
        Value::Int(v) => Ok(ArrayData::Int(ndarray::arr0(*v).into_dyn())),
        Value::Float(v) => Ok(ArrayData::Float(ndarray::arr0(*v).into_dyn())),
        other => Err(Error::InvalidArgument(format!(
            "{other} is not a numeric scalar"
        ))),
    }
}

impl Sealed for Dataset {
    fn vertex(&self) -> &Rc<VertexInner> {
        &self.0
    }
}

impl Vertex for Dataset {
    /// Reflects whether the underlying buffer permits writes.
    fn read_only(&self) -> bool {
        !self.0.dataset_state().writable.get()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Dataset {:?} shape={:?} dtype={} ({} metadata)>",
            self.0.name,
            self.shape(),
            self.dtype(),
            self.0.metadata.len()
        )
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Dataset> for &Dataset {
            type Output = Dataset;

            /// Panics when the fallible [`Dataset::apply`] would fail,
            /// following the convention of the underlying array library.
            fn $method(self, rhs: &Dataset) -> Dataset {
                expect_op(self.apply($op, rhs))
            }
        }

        impl std::ops::$trait<f64> for &Dataset {
            type Output = Dataset;

            fn $method(self, rhs: f64) -> Dataset {
                expect_op(self.apply_scalar($op, rhs))
            }
        }

        impl std::ops::$trait<i64> for &Dataset {
            type Output = Dataset;

            fn $method(self, rhs: i64) -> Dataset {
                expect_op(self.apply_scalar($op, rhs))
            }
        }
    };
}

binary_operator!(Add, add, BinaryOp::Add);
binary_operator!(Sub, sub, BinaryOp::Sub);
binary_operator!(Mul, mul, BinaryOp::Mul);
binary_operator!(Div, div, BinaryOp::Div);
binary_operator!(Rem, rem, BinaryOp::Rem);
binary_operator!(Shl, shl, BinaryOp::Shl);
binary_operator!(Shr, shr, BinaryOp::Shr);
binary_operator!(BitAnd, bitand, BinaryOp::BitAnd);
binary_operator!(BitXor, bitxor, BinaryOp::BitXor);
binary_operator!(BitOr, bitor, BinaryOp::BitOr);

impl std::ops::Neg for &Dataset {
    type Output = Dataset;

    fn neg(self) -> Dataset {
        expect_op(self.apply_unary(UnaryOp::Neg))
    }
}

impl std::ops::Not for &Dataset {
    type Output = Dataset;

    fn not(self) -> Dataset {
        expect_op(self.apply_unary(UnaryOp::Invert))
    }
}

fn expect_op(result: Result<Dataset>) -> Dataset {
    match result {
        Ok(dataset) => dataset,
        Err(e) => panic!("dataset operation failed: {e}"),
    }
}
