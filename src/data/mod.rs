//! The dense buffers wrapped by datasets.
//!
//! [`ArrayData`] is a closed set of buffer kinds: boolean, integer and
//! floating-point arrays of any dimensionality (delegated to [`ndarray`])
//! plus the one-dimensional fixed-layout record buffer used by the
//! logging adapter. Element-wise arithmetic lives in [`ops`].

use std::fmt;

use ndarray::{ArrayD, IxDyn};

use crate::errors::{Error, Result};
use crate::metadata::Value;

pub mod ops;

pub use ops::{BinaryOp, UnaryOp};

/// The element type of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    Bool,
    Int,
    Float,
    Record,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int => "i64",
            DataType::Float => "f64",
            DataType::Record => "record",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One field of a log record row.
///
/// `Empty` is the explicit never-written sentinel: it marks rows that
/// were pre-allocated by the growth policy and distinguishes them from
/// legitimately recorded rows holding falsy values such as `""` or `0`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogValue {
    Empty,
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Empty => f.write_str("<empty>"),
            LogValue::Int(v) => write!(f, "{v}"),
            LogValue::Float(v) => write!(f, "{v}"),
            LogValue::Str(v) => f.write_str(v),
        }
    }
}

/// A one-dimensional buffer of fixed-layout records: one named column
/// per attribute, one [`LogValue`] per cell.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordArray {
    names: Vec<String>,
    rows: Vec<Vec<LogValue>>,
}

impl RecordArray {
    /// An empty record buffer with the given column layout.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::InvalidArgument(
                "a record layout requires at least one attribute name".to_string(),
            ));
        }
        Ok(RecordArray {
            names,
            rows: Vec::new(),
        })
    }

    /// A record buffer pre-allocated with `rows` sentinel rows.
    pub fn with_rows(names: Vec<String>, rows: usize) -> Result<Self> {
        let mut array = RecordArray::new(names)?;
        array.grow_to(rows);
        Ok(array)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Physical row count, including sentinel rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose first column has been written.
    pub fn written_len(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row[0] != LogValue::Empty)
            .count()
    }

    pub fn row(&self, index: usize) -> Option<&[LogValue]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[LogValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// The cells of the named column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<LogValue>> {
        let position = self.names.iter().position(|n| n == name)?;
        Some(self.rows.iter().map(|row| row[position].clone()).collect())
    }

    pub(crate) fn set_row(&mut self, index: usize, row: Vec<LogValue>) -> Result<()> {
        self.check_width(&row)?;
        match self.rows.get_mut(index) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(Error::InvalidArgument(format!(
                "row index {index} out of bounds for {} rows",
                self.rows.len()
            ))),
        }
    }

    pub(crate) fn push_row(&mut self, row: Vec<LogValue>) -> Result<()> {
        self.check_width(&row)?;
        self.rows.push(row);
        Ok(())
    }

    /// Extends the buffer with sentinel rows up to `capacity`; never
    /// shrinks.
    pub(crate) fn grow_to(&mut self, capacity: usize) {
        while self.rows.len() < capacity {
            self.rows.push(vec![LogValue::Empty; self.names.len()]);
        }
    }

    pub(crate) fn retain_rows(&mut self, mut keep: impl FnMut(&[LogValue]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    fn check_width(&self, row: &[LogValue]) -> Result<()> {
        if row.len() != self.names.len() {
            return Err(Error::InvalidArgument(format!(
                "a row of {} fields does not fit a layout of {} columns",
                row.len(),
                self.names.len()
            )));
        }
        Ok(())
    }
}

/// A dense buffer with a fixed element type and shape.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
    Records(RecordArray),
}

impl ArrayData {
    /// A zero-initialized numeric buffer. Record buffers carry a column
    /// layout and cannot be built from a bare shape.
    pub fn zeros(shape: impl Into<Vec<usize>>, dtype: DataType) -> Result<ArrayData> {
        let shape = shape.into();
        let dim = IxDyn(&shape);
        match dtype {
            DataType::Bool => Ok(ArrayData::Bool(ArrayD::from_elem(dim, false))),
            DataType::Int => Ok(ArrayData::Int(ArrayD::zeros(dim))),
            DataType::Float => Ok(ArrayData::Float(ArrayD::zeros(dim))),
            DataType::Record => Err(Error::InvalidArgument(
                "a record buffer requires attribute names, not a bare shape".to_string(),
            )),
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            ArrayData::Bool(_) => DataType::Bool,
            ArrayData::Int(_) => DataType::Int,
            ArrayData::Float(_) => DataType::Float,
            ArrayData::Records(_) => DataType::Record,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            ArrayData::Bool(a) => a.shape().to_vec(),
            ArrayData::Int(a) => a.shape().to_vec(),
            ArrayData::Float(a) => a.shape().to_vec(),
            ArrayData::Records(r) => vec![r.len()],
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            ArrayData::Records(_) => 1,
            _ => self.shape().len(),
        }
    }

    /// Total element count.
    pub fn size(&self) -> usize {
        match self {
            ArrayData::Bool(a) => a.len(),
            ArrayData::Int(a) => a.len(),
            ArrayData::Float(a) => a.len(),
            ArrayData::Records(r) => r.len(),
        }
    }

    /// First-axis length; a 0-dimensional buffer reports its element
    /// count of 1 rather than failing.
    pub fn len_outer(&self) -> usize {
        let shape = self.shape();
        match shape.first() {
            Some(&n) => n,
            None => 1,
        }
    }

    /// The element at `index`, for numeric buffers.
    pub fn get(&self, index: &[usize]) -> Option<Value> {
        match self {
            ArrayData::Bool(a) => a.get(index).map(|&v| Value::Bool(v)),
            ArrayData::Int(a) => a.get(index).map(|&v| Value::Int(v)),
            ArrayData::Float(a) => a.get(index).map(|&v| Value::Float(v)),
            ArrayData::Records(_) => None,
        }
    }

    /// Writes the element at `index`, checking the value against the
    /// element type. Integers coerce into a float buffer; nothing else
    /// coerces.
    pub fn set(&mut self, index: &[usize], value: Value) -> Result<()> {
        let shape = self.shape();
        let expected = self.dtype().name();
        let mismatch = |found: &Value| Error::TypeMismatch {
            expected,
            found: value_kind(found),
        };
        match self {
            ArrayData::Bool(a) => match value {
                Value::Bool(v) => write_at(a, index, v, &shape),
                other => Err(mismatch(&other)),
            },
            ArrayData::Int(a) => match value {
                Value::Int(v) => write_at(a, index, v, &shape),
                other => Err(mismatch(&other)),
            },
            ArrayData::Float(a) => match value {
                Value::Float(v) => write_at(a, index, v, &shape),
                Value::Int(v) => write_at(a, index, v as f64, &shape),
                other => Err(mismatch(&other)),
            },
            ArrayData::Records(_) => Err(Error::TypeMismatch {
                expected: "a numeric buffer",
                found: "record data",
            }),
        }
    }

    /// The record buffer, when this is record data.
    pub fn records(&self) -> Option<&RecordArray> {
        match self {
            ArrayData::Records(r) => Some(r),
            _ => None,
        }
    }

    /// A snapshot of the numeric elements in row-major order. Record
    /// buffers expose their rows through [`ArrayData::records`] instead.
    pub fn iter_values(&self) -> Vec<Value> {
        match self {
            ArrayData::Bool(a) => a.iter().map(|&v| Value::Bool(v)).collect(),
            ArrayData::Int(a) => a.iter().map(|&v| Value::Int(v)).collect(),
            ArrayData::Float(a) => a.iter().map(|&v| Value::Float(v)).collect(),
            ArrayData::Records(_) => Vec::new(),
        }
    }

    /// Coerces the buffer to another element type, the array-coercion
    /// collaborator surface. Record buffers do not coerce.
    pub fn cast(&self, dtype: DataType) -> Result<ArrayData> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        match (self, dtype) {
            (ArrayData::Bool(a), DataType::Int) => {
                Ok(ArrayData::Int(a.mapv(|v| i64::from(v))))
            }
            (ArrayData::Bool(a), DataType::Float) => {
                Ok(ArrayData::Float(a.mapv(|v| if v { 1.0 } else { 0.0 })))
            }
            (ArrayData::Int(a), DataType::Float) => Ok(ArrayData::Float(a.mapv(|v| v as f64))),
            (ArrayData::Int(a), DataType::Bool) => Ok(ArrayData::Bool(a.mapv(|v| v != 0))),
            (ArrayData::Float(a), DataType::Int) => Ok(ArrayData::Int(a.mapv(|v| v as i64))),
            (ArrayData::Float(a), DataType::Bool) => Ok(ArrayData::Bool(a.mapv(|v| v != 0.0))),
            _ => Err(Error::InvalidArgument(format!(
                "cannot cast {} data to {}",
                self.dtype(),
                dtype
            ))),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Int(_) => "i64",
        Value::Float(_) => "f64",
        Value::Str(_) => "str",
        Value::List(_) => "list",
        Value::Map(_) => "map",
    }
}

fn write_at<T>(array: &mut ArrayD<T>, index: &[usize], value: T, shape: &[usize]) -> Result<()> {
    match array.get_mut(index) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(Error::InvalidArgument(format!(
            "index {index:?} out of bounds for shape {shape:?}"
        ))),
    }
}

impl From<ArrayD<bool>> for ArrayData {
    fn from(array: ArrayD<bool>) -> Self {
        ArrayData::Bool(array)
    }
}

impl From<ArrayD<i64>> for ArrayData {
    fn from(array: ArrayD<i64>) -> Self {
        ArrayData::Int(array)
    }
}

impl From<ArrayD<f64>> for ArrayData {
    fn from(array: ArrayD<f64>) -> Self {
        ArrayData::Float(array)
    }
}

impl From<Vec<bool>> for ArrayData {
    fn from(values: Vec<bool>) -> Self {
        ArrayData::Bool(ndarray::Array1::from_vec(values).into_dyn())
    }
}

impl From<Vec<i64>> for ArrayData {
    fn from(values: Vec<i64>) -> Self {
        ArrayData::Int(ndarray::Array1::from_vec(values).into_dyn())
    }
}

impl From<Vec<f64>> for ArrayData {
    fn from(values: Vec<f64>) -> Self {
        ArrayData::Float(ndarray::Array1::from_vec(values).into_dyn())
    }
}

impl From<ndarray::Array2<i64>> for ArrayData {
    fn from(array: ndarray::Array2<i64>) -> Self {
        ArrayData::Int(array.into_dyn())
    }
}

impl From<ndarray::Array2<f64>> for ArrayData {
    fn from(array: ndarray::Array2<f64>) -> Self {
        ArrayData::Float(array.into_dyn())
    }
}

impl From<RecordArray> for ArrayData {
    fn from(records: RecordArray) -> Self {
        ArrayData::Records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_builds_the_requested_buffer() {
        let data = ArrayData::zeros([2, 3], DataType::Float).unwrap();
        assert_eq!(data.dtype(), DataType::Float);
        assert_eq!(data.shape(), [2, 3]);
        assert_eq!(data.size(), 6);
        assert_eq!(data.get(&[1, 2]), Some(Value::Float(0.0)));

        assert!(ArrayData::zeros([2], DataType::Record).is_err());
    }

    #[test]
    fn zero_dimensional_buffers_report_one_element() {
        let data = ArrayData::zeros(Vec::<usize>::new(), DataType::Int).unwrap();
        assert_eq!(data.ndim(), 0);
        assert_eq!(data.len_outer(), 1);
        assert_eq!(data.get(&[]), Some(Value::Int(0)));
    }

    #[test]
    fn set_checks_the_element_type() {
        let mut data = ArrayData::from(vec![0.0, 0.0]);
        data.set(&[0], Value::Float(1.5)).unwrap();
        data.set(&[1], Value::Int(2)).unwrap();
        assert_eq!(data.get(&[0]), Some(Value::Float(1.5)));
        assert_eq!(data.get(&[1]), Some(Value::Float(2.0)));

        assert!(data.set(&[0], Value::Str("x".into())).is_err());
        assert!(data.set(&[9], Value::Float(0.0)).is_err());

        let mut ints = ArrayData::from(vec![1i64]);
        assert!(ints.set(&[0], Value::Float(1.0)).is_err());
    }

    #[test]
    fn cast_coerces_between_numeric_types() {
        let ints = ArrayData::from(vec![0i64, 3, -2]);
        let floats = ints.cast(DataType::Float).unwrap();
        assert_eq!(floats.get(&[1]), Some(Value::Float(3.0)));

        let bools = ints.cast(DataType::Bool).unwrap();
        assert_eq!(
            bools.iter_values(),
            [Value::Bool(false), Value::Bool(true), Value::Bool(true)]
        );

        let truncated = ArrayData::from(vec![1.9, -1.9]).cast(DataType::Int).unwrap();
        assert_eq!(
            truncated.iter_values(),
            [Value::Int(1), Value::Int(-1)]
        );

        assert!(ints.cast(DataType::Record).is_err());
    }

    #[test]
    fn record_rows_track_the_written_sentinel() {
        let mut records =
            RecordArray::with_rows(vec!["levelname".into(), "message".into()], 3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records.written_len(), 0);

        records
            .set_row(0, vec![LogValue::Str("INFO".into()), LogValue::Str("hi".into())])
            .unwrap();
        assert_eq!(records.written_len(), 1);

        // A falsy-but-written first column still counts as written.
        records
            .set_row(1, vec![LogValue::Str(String::new()), LogValue::Empty])
            .unwrap();
        assert_eq!(records.written_len(), 2);

        records.retain_rows(|row| row[0] != LogValue::Empty);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn record_layout_is_validated() {
        assert!(RecordArray::new(Vec::new()).is_err());

        let mut records = RecordArray::new(vec!["message".into()]).unwrap();
        assert!(records
            .push_row(vec![LogValue::Empty, LogValue::Empty])
            .is_err());
        assert!(records.set_row(5, vec![LogValue::Empty]).is_err());
    }

    #[test]
    fn columns_are_selected_by_name() {
        let mut records =
            RecordArray::new(vec!["levelname".into(), "message".into()]).unwrap();
        records
            .push_row(vec![LogValue::Str("INFO".into()), LogValue::Str("a".into())])
            .unwrap();
        records
            .push_row(vec![LogValue::Str("ERROR".into()), LogValue::Str("b".into())])
            .unwrap();

        assert_eq!(
            records.column("levelname").unwrap(),
            [LogValue::Str("INFO".into()), LogValue::Str("ERROR".into())]
        );
        assert!(records.column("missing").is_none());
    }
}
