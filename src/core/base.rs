use nalgebra::RealField;

/// The base trait for [`Function`](super::function::Function) and
/// [`Gradient`](super::function::Gradient).
pub trait Problem {
    /// Type of the scalar, usually f32 or f64.
    type Field: RealField + Copy;

    /// Returns the dimension of the problem, that is, the length of the
    /// variable vector passed to the evaluation methods.
    fn dim(&self) -> usize;
}
