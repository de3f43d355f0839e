/// Vector-valued function abstractions and numerical differentiation
pub mod calculus;
/// Newton's method with relative step and absolute residual termination
pub mod newton;
