//! Element-wise arithmetic and bitwise kernels over [`ArrayData`].
//!
//! The kernels are pure functions independent of Rust's operator traits;
//! the dataset type binds them to `std::ops`. Promotion follows the
//! numeric tower Bool -> Int -> Float, true division always yields
//! floats, and floored division/modulo follow the convention where the
//! remainder takes the sign of the divisor.

use ndarray::{ArrayD, Ix1, Ix2};

use super::ArrayData;
use crate::errors::{Error, Result};

/// A binary element-wise operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// True division; the result is always floating-point.
    Div,
    /// Floored division.
    FloorDiv,
    /// Floored modulo; the remainder takes the sign of the divisor.
    Rem,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
    MatMul,
}

impl BinaryOp {
    /// Stable lowercase name, used for synthetic result labels.
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::FloorDiv => "floordiv",
            BinaryOp::Rem => "mod",
            BinaryOp::Pow => "pow",
            BinaryOp::Shl => "lshift",
            BinaryOp::Shr => "rshift",
            BinaryOp::BitAnd => "and",
            BinaryOp::BitXor => "xor",
            BinaryOp::BitOr => "or",
            BinaryOp::MatMul => "matmul",
        }
    }
}

/// A unary element-wise operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Abs,
    /// Logical not on booleans, bitwise not on integers.
    Invert,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Pos => "pos",
            UnaryOp::Abs => "abs",
            UnaryOp::Invert => "invert",
        }
    }
}

/// Applies `op` element-wise, with scalar broadcast when either operand
/// holds a single element.
pub(crate) fn binary(op: BinaryOp, lhs: &ArrayData, rhs: &ArrayData) -> Result<ArrayData> {
    match op {
        BinaryOp::Add => arithmetic(op, lhs, rhs, |a, b| a.checked_add(b), |a, b| a + b),
        BinaryOp::Sub => arithmetic(op, lhs, rhs, |a, b| a.checked_sub(b), |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, lhs, rhs, |a, b| a.checked_mul(b), |a, b| a * b),
        BinaryOp::Div => {
            let a = as_float(lhs).ok_or_else(|| unsupported(op, lhs))?;
            let b = as_float(rhs).ok_or_else(|| unsupported(op, rhs))?;
            Ok(ArrayData::Float(try_elementwise(&a, &b, |x, y| {
                Ok(x / y)
            })?))
        }
        BinaryOp::FloorDiv => {
            if let (Some(a), Some(b)) = (as_int(lhs), as_int(rhs)) {
                Ok(ArrayData::Int(try_elementwise(&a, &b, |&x, &y| {
                    floor_div(x, y)
                })?))
            } else {
                let a = as_float(lhs).ok_or_else(|| unsupported(op, lhs))?;
                let b = as_float(rhs).ok_or_else(|| unsupported(op, rhs))?;
                Ok(ArrayData::Float(try_elementwise(&a, &b, |x, y| {
                    Ok((x / y).floor())
                })?))
            }
        }
        BinaryOp::Rem => {
            if let (Some(a), Some(b)) = (as_int(lhs), as_int(rhs)) {
                Ok(ArrayData::Int(try_elementwise(&a, &b, |&x, &y| {
                    floor_mod(x, y)
                })?))
            } else {
                let a = as_float(lhs).ok_or_else(|| unsupported(op, lhs))?;
                let b = as_float(rhs).ok_or_else(|| unsupported(op, rhs))?;
                Ok(ArrayData::Float(try_elementwise(&a, &b, |x, y| {
                    Ok(x - y * (x / y).floor())
                })?))
            }
        }
        BinaryOp::Pow => power(lhs, rhs),
        BinaryOp::Shl => {
            let (a, b) = int_operands(op, lhs, rhs)?;
            Ok(ArrayData::Int(try_elementwise(&a, &b, |&x, &y| {
                shift(x, y, true)
            })?))
        }
        BinaryOp::Shr => {
            let (a, b) = int_operands(op, lhs, rhs)?;
            Ok(ArrayData::Int(try_elementwise(&a, &b, |&x, &y| {
                shift(x, y, false)
            })?))
        }
        BinaryOp::BitAnd => bitwise(op, lhs, rhs, |a, b| a & b, |a, b| a & b),
        BinaryOp::BitXor => bitwise(op, lhs, rhs, |a, b| a ^ b, |a, b| a ^ b),
        BinaryOp::BitOr => bitwise(op, lhs, rhs, |a, b| a | b, |a, b| a | b),
        BinaryOp::MatMul => matmul(lhs, rhs),
    }
}

/// Applies `op` element-wise to a single operand.
pub(crate) fn unary(op: UnaryOp, operand: &ArrayData) -> Result<ArrayData> {
    match (op, operand) {
        (UnaryOp::Pos, ArrayData::Int(_) | ArrayData::Float(_)) => Ok(operand.clone()),
        (UnaryOp::Neg, ArrayData::Int(a)) => Ok(ArrayData::Int(try_unary(a, |&x| {
            x.checked_neg()
                .ok_or_else(|| Error::Arithmetic("integer negation overflow".to_string()))
        })?)),
        (UnaryOp::Neg, ArrayData::Float(a)) => Ok(ArrayData::Float(a.mapv(|x| -x))),
        (UnaryOp::Abs, ArrayData::Int(a)) => Ok(ArrayData::Int(try_unary(a, |&x| {
            x.checked_abs()
                .ok_or_else(|| Error::Arithmetic("integer absolute-value overflow".to_string()))
        })?)),
        (UnaryOp::Abs, ArrayData::Float(a)) => Ok(ArrayData::Float(a.mapv(f64::abs))),
        (UnaryOp::Invert, ArrayData::Bool(a)) => Ok(ArrayData::Bool(a.mapv(|x| !x))),
        (UnaryOp::Invert, ArrayData::Int(a)) => Ok(ArrayData::Int(a.mapv(|x| !x))),
        _ => Err(unsupported_unary(op, operand)),
    }
}

fn arithmetic(
    op: BinaryOp,
    lhs: &ArrayData,
    rhs: &ArrayData,
    int_kernel: impl Fn(i64, i64) -> Option<i64>,
    float_kernel: impl Fn(f64, f64) -> f64,
) -> Result<ArrayData> {
    if let (Some(a), Some(b)) = (as_int(lhs), as_int(rhs)) {
        let name = op.name();
        return Ok(ArrayData::Int(try_elementwise(&a, &b, |&x, &y| {
            int_kernel(x, y)
                .ok_or_else(|| Error::Arithmetic(format!("integer overflow in {name}")))
        })?));
    }
    let a = as_float(lhs).ok_or_else(|| unsupported(op, lhs))?;
    let b = as_float(rhs).ok_or_else(|| unsupported(op, rhs))?;
    Ok(ArrayData::Float(try_elementwise(&a, &b, |&x, &y| {
        Ok(float_kernel(x, y))
    })?))
}

fn bitwise(
    op: BinaryOp,
    lhs: &ArrayData,
    rhs: &ArrayData,
    bool_kernel: impl Fn(bool, bool) -> bool,
    int_kernel: impl Fn(i64, i64) -> i64,
) -> Result<ArrayData> {
    if let (ArrayData::Bool(a), ArrayData::Bool(b)) = (lhs, rhs) {
        return Ok(ArrayData::Bool(try_elementwise(a, b, |&x, &y| {
            Ok(bool_kernel(x, y))
        })?));
    }
    let (a, b) = int_operands(op, lhs, rhs)?;
    Ok(ArrayData::Int(try_elementwise(&a, &b, |&x, &y| {
        Ok(int_kernel(x, y))
    })?))
}

fn power(lhs: &ArrayData, rhs: &ArrayData) -> Result<ArrayData> {
    if let (Some(a), Some(b)) = (as_int(lhs), as_int(rhs)) {
        // An integer base stays integral only for non-negative exponents.
        if b.iter().all(|&e| e >= 0) {
            return Ok(ArrayData::Int(try_elementwise(&a, &b, |&x, &y| {
                let exp = u32::try_from(y)
                    .map_err(|_| Error::Arithmetic(format!("exponent {y} out of range")))?;
                x.checked_pow(exp)
                    .ok_or_else(|| Error::Arithmetic("integer overflow in pow".to_string()))
            })?));
        }
    }
    let a = as_float(lhs).ok_or_else(|| unsupported(BinaryOp::Pow, lhs))?;
    let b = as_float(rhs).ok_or_else(|| unsupported(BinaryOp::Pow, rhs))?;
    Ok(ArrayData::Float(try_elementwise(&a, &b, |&x, &y: &f64| {
        Ok(x.powf(y))
    })?))
}

fn matmul(lhs: &ArrayData, rhs: &ArrayData) -> Result<ArrayData> {
    let a = as_float(lhs).ok_or_else(|| unsupported(BinaryOp::MatMul, lhs))?;
    let b = as_float(rhs).ok_or_else(|| unsupported(BinaryOp::MatMul, rhs))?;
    let (lhs_shape, rhs_shape) = (a.shape().to_vec(), b.shape().to_vec());
    let mismatch = move || {
        Error::ShapeMismatch(format!(
            "cannot multiply shapes {lhs_shape:?} and {rhs_shape:?}"
        ))
    };
    match (a.ndim(), b.ndim()) {
        (2, 2) => {
            let a = a.into_dimensionality::<Ix2>().map_err(|_| mismatch())?;
            let b = b.into_dimensionality::<Ix2>().map_err(|_| mismatch())?;
            if a.shape()[1] != b.shape()[0] {
                return Err(mismatch());
            }
            Ok(ArrayData::Float(a.dot(&b).into_dyn()))
        }
        (2, 1) => {
            let a = a.into_dimensionality::<Ix2>().map_err(|_| mismatch())?;
            let b = b.into_dimensionality::<Ix1>().map_err(|_| mismatch())?;
            if a.shape()[1] != b.len() {
                return Err(mismatch());
            }
            Ok(ArrayData::Float(a.dot(&b).into_dyn()))
        }
        (1, 2) => {
            let a = a.into_dimensionality::<Ix1>().map_err(|_| mismatch())?;
            let b = b.into_dimensionality::<Ix2>().map_err(|_| mismatch())?;
            if a.len() != b.shape()[0] {
                return Err(mismatch());
            }
            Ok(ArrayData::Float(a.dot(&b).into_dyn()))
        }
        (1, 1) => {
            let a = a.into_dimensionality::<Ix1>().map_err(|_| mismatch())?;
            let b = b.into_dimensionality::<Ix1>().map_err(|_| mismatch())?;
            if a.len() != b.len() {
                return Err(mismatch());
            }
            Ok(ArrayData::Float(ndarray::arr0(a.dot(&b)).into_dyn()))
        }
        _ => Err(mismatch()),
    }
}

/// Floored integer division: the quotient rounds toward negative
/// infinity.
fn floor_div(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(Error::Arithmetic("integer division by zero".to_string()));
    }
    let q = a / b;
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
}

/// Floored integer modulo: the remainder takes the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(Error::Arithmetic("integer modulo by zero".to_string()));
    }
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
}

fn shift(value: i64, count: i64, left: bool) -> Result<i64> {
    let count = u32::try_from(count)
        .ok()
        .filter(|&c| c < 64)
        .ok_or_else(|| Error::Arithmetic(format!("shift count {count} out of range")))?;
    Ok(if left {
        value << count
    } else {
        value >> count
    })
}

/// Broadcasts the operands to a common shape: shapes must match, or one
/// operand must hold a single element.
fn broadcast_pair<T: Clone>(a: &ArrayD<T>, b: &ArrayD<T>) -> Result<(ArrayD<T>, ArrayD<T>)> {
    if a.shape() == b.shape() {
        return Ok((a.clone(), b.clone()));
    }
    if b.len() == 1 {
        if let Some(value) = b.first() {
            return Ok((a.clone(), ArrayD::from_elem(a.raw_dim(), value.clone())));
        }
    }
    if a.len() == 1 {
        if let Some(value) = a.first() {
            return Ok((ArrayD::from_elem(b.raw_dim(), value.clone()), b.clone()));
        }
    }
    Err(Error::ShapeMismatch(format!(
        "{:?} does not match {:?}",
        a.shape(),
        b.shape()
    )))
}

fn try_elementwise<T: Clone, R>(
    a: &ArrayD<T>,
    b: &ArrayD<T>,
    kernel: impl Fn(&T, &T) -> Result<R>,
) -> Result<ArrayD<R>> {
    let (a, b) = broadcast_pair(a, b)?;
    let mut out = Vec::with_capacity(a.len());
    for (x, y) in a.iter().zip(b.iter()) {
        out.push(kernel(x, y)?);
    }
    ArrayD::from_shape_vec(a.raw_dim(), out).map_err(|e| Error::ShapeMismatch(e.to_string()))
}

fn try_unary<T, R>(a: &ArrayD<T>, kernel: impl Fn(&T) -> Result<R>) -> Result<ArrayD<R>> {
    let mut out = Vec::with_capacity(a.len());
    for x in a.iter() {
        out.push(kernel(x)?);
    }
    ArrayD::from_shape_vec(a.raw_dim(), out).map_err(|e| Error::ShapeMismatch(e.to_string()))
}

/// The operand viewed as integers; floats and records do not narrow.
fn as_int(data: &ArrayData) -> Option<ArrayD<i64>> {
    match data {
        ArrayData::Bool(a) => Some(a.mapv(i64::from)),
        ArrayData::Int(a) => Some(a.clone()),
        _ => None,
    }
}

/// The operand viewed as floats; records do not promote.
fn as_float(data: &ArrayData) -> Option<ArrayD<f64>> {
    match data {
        ArrayData::Bool(a) => Some(a.mapv(|v| if v { 1.0 } else { 0.0 })),
        ArrayData::Int(a) => Some(a.mapv(|v| v as f64)),
        ArrayData::Float(a) => Some(a.clone()),
        ArrayData::Records(_) => None,
    }
}

fn int_operands(op: BinaryOp, lhs: &ArrayData, rhs: &ArrayData) -> Result<(ArrayD<i64>, ArrayD<i64>)> {
    let a = as_int(lhs).ok_or_else(|| unsupported(op, lhs))?;
    let b = as_int(rhs).ok_or_else(|| unsupported(op, rhs))?;
    Ok((a, b))
}

fn unsupported(op: BinaryOp, operand: &ArrayData) -> Error {
    Error::UnsupportedOperand {
        op: op.name(),
        dtype: operand.dtype().name(),
    }
}

fn unsupported_unary(op: UnaryOp, operand: &ArrayData) -> Error {
    Error::UnsupportedOperand {
        op: op.name(),
        dtype: operand.dtype().name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;
    use rstest::rstest;

    fn ints(values: Vec<i64>) -> ArrayData {
        ArrayData::from(values)
    }

    fn floats(values: Vec<f64>) -> ArrayData {
        ArrayData::from(values)
    }

    #[test]
    fn integer_addition_stays_integral() {
        let sum = binary(BinaryOp::Add, &ints(vec![1, 2]), &ints(vec![10, 20])).unwrap();
        assert_eq!(sum, ints(vec![11, 22]));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let sum = binary(BinaryOp::Add, &ints(vec![1, 2]), &floats(vec![0.5, 0.5])).unwrap();
        assert_eq!(sum, floats(vec![1.5, 2.5]));
    }

    #[test]
    fn true_division_always_yields_floats() {
        let q = binary(BinaryOp::Div, &ints(vec![3]), &ints(vec![2])).unwrap();
        assert_eq!(q, floats(vec![1.5]));
    }

    #[rstest]
    #[case(7, 2, 3)]
    #[case(-7, 2, -4)]
    #[case(7, -2, -4)]
    #[case(-7, -2, 3)]
    fn floored_division_rounds_toward_negative_infinity(
        #[case] a: i64,
        #[case] b: i64,
        #[case] expected: i64,
    ) {
        let q = binary(BinaryOp::FloorDiv, &ints(vec![a]), &ints(vec![b])).unwrap();
        assert_eq!(q, ints(vec![expected]));
    }

    #[rstest]
    #[case(7, 2, 1)]
    #[case(-7, 2, 1)]
    #[case(7, -2, -1)]
    #[case(-7, -2, -1)]
    fn floored_modulo_takes_the_divisor_sign(
        #[case] a: i64,
        #[case] b: i64,
        #[case] expected: i64,
    ) {
        let r = binary(BinaryOp::Rem, &ints(vec![a]), &ints(vec![b])).unwrap();
        assert_eq!(r, ints(vec![expected]));
    }

    #[test]
    fn division_by_zero_is_surfaced() {
        assert!(matches!(
            binary(BinaryOp::FloorDiv, &ints(vec![1]), &ints(vec![0])),
            Err(Error::Arithmetic(_))
        ));
        // Float division by zero follows IEEE semantics instead.
        let q = binary(BinaryOp::Div, &floats(vec![1.0]), &floats(vec![0.0])).unwrap();
        assert_eq!(q.iter_values()[0].as_float(), Some(f64::INFINITY));
    }

    #[test]
    fn pow_stays_integral_only_for_non_negative_exponents() {
        let p = binary(BinaryOp::Pow, &ints(vec![2, 3]), &ints(vec![3, 2])).unwrap();
        assert_eq!(p, ints(vec![8, 9]));

        let p = binary(BinaryOp::Pow, &ints(vec![2]), &ints(vec![-1])).unwrap();
        assert_eq!(p, floats(vec![0.5]));
    }

    #[test]
    fn shifts_are_integer_only() {
        let shifted = binary(BinaryOp::Shl, &ints(vec![1, 2]), &ints(vec![4, 1])).unwrap();
        assert_eq!(shifted, ints(vec![16, 4]));

        assert!(matches!(
            binary(BinaryOp::Shl, &floats(vec![1.0]), &floats(vec![1.0])),
            Err(Error::UnsupportedOperand { .. })
        ));
        assert!(matches!(
            binary(BinaryOp::Shr, &ints(vec![1]), &ints(vec![-1])),
            Err(Error::Arithmetic(_))
        ));
    }

    #[test]
    fn bitwise_on_booleans_is_logical() {
        let a = ArrayData::from(vec![true, true, false]);
        let b = ArrayData::from(vec![true, false, false]);
        assert_eq!(
            binary(BinaryOp::BitAnd, &a, &b).unwrap(),
            ArrayData::from(vec![true, false, false])
        );
        assert_eq!(
            binary(BinaryOp::BitOr, &a, &b).unwrap(),
            ArrayData::from(vec![true, true, false])
        );
        assert_eq!(
            binary(BinaryOp::BitXor, &a, &b).unwrap(),
            ArrayData::from(vec![false, true, false])
        );
    }

    #[test]
    fn scalar_operands_broadcast() {
        let scaled = binary(BinaryOp::Mul, &floats(vec![1.0, 2.0, 3.0]), &floats(vec![2.0]))
            .unwrap();
        assert_eq!(scaled, floats(vec![2.0, 4.0, 6.0]));

        assert!(matches!(
            binary(BinaryOp::Add, &floats(vec![1.0, 2.0]), &floats(vec![1.0, 2.0, 3.0])),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn matmul_covers_the_one_and_two_dimensional_combinations() {
        let a = ArrayData::from(ndarray::arr2(&[[1.0, 2.0], [3.0, 4.0]]));
        let b = ArrayData::from(ndarray::arr2(&[[5.0, 6.0], [7.0, 8.0]]));
        let product = binary(BinaryOp::MatMul, &a, &b).unwrap();
        assert_eq!(
            product,
            ArrayData::from(ndarray::arr2(&[[19.0, 22.0], [43.0, 50.0]]))
        );

        let v = floats(vec![1.0, 1.0]);
        let av = binary(BinaryOp::MatMul, &a, &v).unwrap();
        assert_eq!(av, floats(vec![3.0, 7.0]));

        let dot = binary(BinaryOp::MatMul, &v, &v).unwrap();
        assert_eq!(dot.ndim(), 0);
        assert_eq!(dot.get(&[]).and_then(|v| v.as_float()), Some(2.0));

        assert!(matches!(
            binary(BinaryOp::MatMul, &a, &floats(vec![1.0, 1.0, 1.0])),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn records_do_not_support_arithmetic() {
        let records = crate::data::RecordArray::new(vec!["message".into()]).unwrap();
        let data = ArrayData::from(records);
        assert!(matches!(
            binary(BinaryOp::Add, &data, &ints(vec![1])),
            Err(Error::UnsupportedOperand { .. })
        ));
    }

    #[test]
    fn unary_operations() {
        assert_eq!(unary(UnaryOp::Neg, &ints(vec![1, -2])).unwrap(), ints(vec![-1, 2]));
        assert_eq!(unary(UnaryOp::Abs, &floats(vec![-1.5])).unwrap(), floats(vec![1.5]));
        assert_eq!(unary(UnaryOp::Pos, &ints(vec![3])).unwrap(), ints(vec![3]));
        assert_eq!(
            unary(UnaryOp::Invert, &ints(vec![0])).unwrap(),
            ints(vec![-1])
        );
        assert_eq!(
            unary(UnaryOp::Invert, &ArrayData::from(vec![true, false])).unwrap(),
            ArrayData::from(vec![false, true])
        );
        assert!(unary(UnaryOp::Invert, &floats(vec![1.0])).is_err());
        assert!(matches!(
            unary(UnaryOp::Neg, &ArrayData::from(vec![true])),
            Err(Error::UnsupportedOperand { .. })
        ));
    }

    #[test]
    fn cast_and_ops_compose() {
        let bools = ArrayData::from(vec![true, false]);
        let sum = binary(BinaryOp::Add, &bools, &ints(vec![1, 1])).unwrap();
        assert_eq!(sum.dtype(), DataType::Int);
        assert_eq!(sum, ints(vec![2, 1]));
    }
}
