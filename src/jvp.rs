//! Forward-mode differentiation rule.
//!
//! Differentiating `M = E - e·sin E` implicitly gives
//!
//! ```text
//! dE      = (dM + de·sin E) / (1 - e·cos E)
//! d sin E =  cos E · dE
//! d cos E = -sin E · dE
//! ```
//!
//! The rule is written once, in [`jvp_rule`], over the [`Operand`] algebra.
//! Plain tensors give first derivatives; [`Dual`] numbers, whose `kepler`
//! recurses into the same rule, give second and higher derivatives.
//!
//! # Example
//! ```rust
//! use kepler_op::jvp::{jvp_rule, Tangent};
//! use kepler_op::tensor;
//!
//! let m = tensor!([1.0f64]);
//! let e = tensor!([0.3f64]);
//! let ((sin_e, _), (dsin, _)) =
//!     jvp_rule((&m, &e), (Tangent::Value(tensor!([1.0f64])), Tangent::Zero)).unwrap();
//! assert!(sin_e.data[0] > 0.0 && dsin.data[0].is_finite());
//! ```
//!
//! No guard is placed on `1 - e·cos E`; for `e ≥ 1` the primal is already
//! `NaN` and the tangents follow IEEE arithmetic.

use crate::dtype::Float;
use crate::error::KeplerError;
use crate::primitive::kepler_primitive;
use crate::tensors::{Array, Tensor};

/// Input tangent: either an exact zero or a materialized value.
///
/// `Zero` avoids allocating zero tensors for inputs that are not being
/// differentiated; it is resolved only when the rule needs the value.
#[derive(Debug, Clone, PartialEq)]
pub enum Tangent<X> {
    /// Symbolic zero, shaped like the corresponding primal.
    Zero,
    /// Materialized tangent.
    Value(X),
}

impl<X> Tangent<X> {
    /// Materializes the tangent, using zeros shaped like `primal` for [`Tangent::Zero`].
    pub fn resolve(self, primal: &X) -> X
    where
        X: Operand,
    {
        match self {
            Self::Zero => primal.zeros_like(),
            Self::Value(t) => t,
        }
    }

    /// Transforms a materialized value, keeping `Zero` symbolic.
    ///
    /// # Errors
    /// Whatever `f` returns.
    pub fn try_map<Y, E>(self, f: impl FnOnce(X) -> Result<Y, E>) -> Result<Tangent<Y>, E> {
        match self {
            Self::Zero => Ok(Tangent::Zero),
            Self::Value(t) => f(t).map(Tangent::Value),
        }
    }
}

impl<X> From<X> for Tangent<X> {
    fn from(value: X) -> Self {
        Self::Value(value)
    }
}

/// Values the differentiation rule can be evaluated over.
///
/// Arithmetic is element-wise between same-shape operands.
pub trait Operand: Clone {
    /// Dimension sizes.
    fn shape(&self) -> &[usize];
    /// Zeros shaped like `self`.
    #[must_use]
    fn zeros_like(&self) -> Self;
    /// Ones shaped like `self`.
    #[must_use]
    fn ones_like(&self) -> Self;
    /// `self + rhs`.
    #[must_use]
    fn add(&self, rhs: &Self) -> Self;
    /// `self - rhs`.
    #[must_use]
    fn sub(&self, rhs: &Self) -> Self;
    /// `self * rhs`.
    #[must_use]
    fn mul(&self, rhs: &Self) -> Self;
    /// `self / rhs`.
    #[must_use]
    fn div(&self, rhs: &Self) -> Self;
    /// `-self`.
    #[must_use]
    fn neg(&self) -> Self;

    /// Evaluates the primitive, returning `(sin E, cos E)`.
    ///
    /// No normalization is applied: the inputs are taken to be same-shape and
    /// already wrapped.
    ///
    /// # Errors
    /// Whatever the primitive reports.
    fn kepler(mean_anomaly: &Self, eccentricity: &Self) -> Result<(Self, Self), KeplerError>;
}

impl<T: Float> Operand for Tensor<T> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn zeros_like(&self) -> Self {
        Self::zeros_like(self)
    }

    fn ones_like(&self) -> Self {
        Self::ones_like(self)
    }

    fn add(&self, rhs: &Self) -> Self {
        self + rhs
    }

    fn sub(&self, rhs: &Self) -> Self {
        self - rhs
    }

    fn mul(&self, rhs: &Self) -> Self {
        self * rhs
    }

    fn div(&self, rhs: &Self) -> Self {
        self / rhs
    }

    fn neg(&self) -> Self {
        -self
    }

    fn kepler(mean_anomaly: &Self, eccentricity: &Self) -> Result<(Self, Self), KeplerError> {
        let (sin_e, cos_e) = kepler_primitive().bind(
            &T::into_array(mean_anomaly.clone()),
            &T::into_array(eccentricity.clone()),
        )?;
        Ok((T::from_array(sin_e)?, T::from_array(cos_e)?))
    }
}

/// Dual number: a value together with one directional derivative.
#[derive(Debug, Clone, PartialEq)]
pub struct Dual<X> {
    /// Value.
    pub primal: X,
    /// Derivative along the seeded direction.
    pub tangent: X,
}

impl<X: Operand> Dual<X> {
    /// A dual number seeded with `tangent`.
    pub const fn new(primal: X, tangent: X) -> Self {
        Self { primal, tangent }
    }

    /// A dual number with zero derivative.
    pub fn constant(primal: X) -> Self {
        let tangent = primal.zeros_like();
        Self { primal, tangent }
    }
}

impl<X: Operand> Operand for Dual<X> {
    fn shape(&self) -> &[usize] {
        self.primal.shape()
    }

    fn zeros_like(&self) -> Self {
        Self::constant(self.primal.zeros_like())
    }

    fn ones_like(&self) -> Self {
        Self::constant(self.primal.ones_like())
    }

    fn add(&self, rhs: &Self) -> Self {
        Self::new(self.primal.add(&rhs.primal), self.tangent.add(&rhs.tangent))
    }

    fn sub(&self, rhs: &Self) -> Self {
        Self::new(self.primal.sub(&rhs.primal), self.tangent.sub(&rhs.tangent))
    }

    fn mul(&self, rhs: &Self) -> Self {
        let tangent = self
            .tangent
            .mul(&rhs.primal)
            .add(&self.primal.mul(&rhs.tangent));
        Self::new(self.primal.mul(&rhs.primal), tangent)
    }

    fn div(&self, rhs: &Self) -> Self {
        let primal = self.primal.div(&rhs.primal);
        let tangent = self
            .tangent
            .sub(&primal.mul(&rhs.tangent))
            .div(&rhs.primal);
        Self::new(primal, tangent)
    }

    fn neg(&self) -> Self {
        Self::new(self.primal.neg(), self.tangent.neg())
    }

    fn kepler(mean_anomaly: &Self, eccentricity: &Self) -> Result<(Self, Self), KeplerError> {
        let ((sin_e, cos_e), (dsin, dcos)) = jvp_rule(
            (&mean_anomaly.primal, &eccentricity.primal),
            (
                Tangent::Value(mean_anomaly.tangent.clone()),
                Tangent::Value(eccentricity.tangent.clone()),
            ),
        )?;
        Ok((Self::new(sin_e, dsin), Self::new(cos_e, dcos)))
    }
}

/// Primal outputs and output tangents, each as `(sin E, cos E)`.
pub type JvpOutput<X> = ((X, X), (X, X));

/// Applies the differentiation rule over any [`Operand`].
///
/// Recomputes the primal with [`Operand::kepler`] (no normalization), resolves
/// symbolic-zero tangents, and returns `((sin E, cos E), (d sin E, d cos E))`.
///
/// # Errors
/// - Whatever the primitive reports for the primals.
/// - [`KeplerError::InvalidArgument`] if a tangent is not shaped like its primal.
pub fn jvp_rule<X: Operand>(
    primals: (&X, &X),
    tangents: (Tangent<X>, Tangent<X>),
) -> Result<JvpOutput<X>, KeplerError> {
    let (mean_anomaly, eccentricity) = primals;
    let (sin_e, cos_e) = X::kepler(mean_anomaly, eccentricity)?;

    let dm = tangents.0.resolve(mean_anomaly);
    let de = tangents.1.resolve(eccentricity);
    check_tangent("mean anomaly", &dm, mean_anomaly)?;
    check_tangent("eccentricity", &de, eccentricity)?;

    let denom = mean_anomaly.ones_like().sub(&eccentricity.mul(&cos_e));
    let d_ecc_anom = dm.add(&de.mul(&sin_e)).div(&denom);

    let dsin = cos_e.mul(&d_ecc_anom);
    let dcos = sin_e.neg().mul(&d_ecc_anom);
    Ok(((sin_e, cos_e), (dsin, dcos)))
}

fn check_tangent<X: Operand>(name: &str, tangent: &X, primal: &X) -> Result<(), KeplerError> {
    if tangent.shape() == primal.shape() {
        Ok(())
    } else {
        Err(KeplerError::InvalidArgument(format!(
            "{name} tangent has shape {:?}, primal has {:?}",
            tangent.shape(),
            primal.shape()
        )))
    }
}

/// The differentiation rule on dtype-erased arrays, as registered on the
/// primitive.
///
/// # Errors
/// - [`KeplerError::TypeMismatch`] if the primals have different dtypes.
/// - [`KeplerError::UnexpectedDType`] if a tangent's dtype differs from its primal's.
/// - Otherwise as [`jvp_rule`].
pub fn kepler_jvp(
    primals: (&Array, &Array),
    tangents: (Tangent<Array>, Tangent<Array>),
) -> Result<JvpOutput<Array>, KeplerError> {
    match primals {
        (Array::F32(m), Array::F32(e)) => typed_jvp(m, e, tangents),
        (Array::F64(m), Array::F64(e)) => typed_jvp(m, e, tangents),
        (m, e) => Err(KeplerError::TypeMismatch {
            mean_anomaly: m.dtype(),
            eccentricity: e.dtype(),
        }),
    }
}

fn typed_jvp<T: Float>(
    mean_anomaly: &Tensor<T>,
    eccentricity: &Tensor<T>,
    tangents: (Tangent<Array>, Tangent<Array>),
) -> Result<JvpOutput<Array>, KeplerError> {
    let dm = tangents.0.try_map(T::from_array)?;
    let de = tangents.1.try_map(T::from_array)?;
    let ((sin_e, cos_e), (dsin, dcos)) = jvp_rule((mean_anomaly, eccentricity), (dm, de))?;
    Ok((
        (T::into_array(sin_e), T::into_array(cos_e)),
        (T::into_array(dsin), T::into_array(dcos)),
    ))
}
