//! Chassis-space direction conventions: +Y up, +Z forward, +X toward the
//! right wheel. Everything that converts between chassis and world space
//! goes through these helpers so the convention lives in one place.

use nalgebra::{Unit, Vector3};
use rapier3d::prelude::Real;

#[inline]
pub fn up() -> Vector3<Real> {
    Vector3::y()
}

#[inline]
pub fn down() -> Vector3<Real> {
    -Vector3::y()
}

#[inline]
pub fn forward() -> Vector3<Real> {
    Vector3::z()
}

#[inline]
pub fn up_axis() -> Unit<Vector3<Real>> {
    Vector3::y_axis()
}

#[inline]
pub fn forward_axis() -> Unit<Vector3<Real>> {
    Vector3::z_axis()
}
