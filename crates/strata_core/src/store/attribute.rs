//! # Attributes
//!
//! Attributes are pure data mirrored per record into destination buffers.
//! They must be Pod and have a fixed stride so pages can store them as raw
//! byte columns and sync jobs can copy them without knowing the type.

use bytemuck::{Pod, Zeroable};

/// Identifies an attribute column across the store and the render side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey(pub u16);

/// Byte layout of one attribute column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeLayout {
    /// Column identity.
    pub key: AttributeKey,
    /// Size in bytes of one element.
    pub stride: usize,
    /// Human readable name (buffer labels, diagnostics).
    pub name: &'static str,
}

impl AttributeLayout {
    /// Creates a layout for a raw column.
    #[must_use]
    pub const fn new(key: AttributeKey, stride: usize, name: &'static str) -> Self {
        Self { key, stride, name }
    }
}

/// Marker trait for typed attributes.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Emission {
///     rgb: [f32; 3],
///     intensity: f32,
/// }
///
/// impl Attribute for Emission {
///     const KEY: AttributeKey = AttributeKey(7);
///     const NAME: &'static str = "emission";
/// }
/// ```
pub trait Attribute: Copy + Pod + Zeroable + Default + Send + Sync + 'static {
    /// Unique key of this attribute type.
    const KEY: AttributeKey;
    /// Name used for labels.
    const NAME: &'static str;

    /// Returns the column layout of this attribute.
    #[must_use]
    fn layout() -> AttributeLayout {
        AttributeLayout::new(Self::KEY, std::mem::size_of::<Self>(), Self::NAME)
    }
}

/// World-space position, padded to 16 bytes for GPU alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z coordinate in world space.
    pub z: f32,
    /// Padding for alignment.
    pub _padding: f32,
}

impl Attribute for Position {
    const KEY: AttributeKey = AttributeKey(0);
    const NAME: &'static str = "position";
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }
}

/// Linear RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    /// Red, green, blue, alpha.
    pub rgba: [f32; 4],
}

impl Attribute for Color {
    const KEY: AttributeKey = AttributeKey(1);
    const NAME: &'static str = "color";
}

impl Color {
    /// Creates a color from components.
    #[inline]
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { rgba: [r, g, b, a] }
    }
}

/// Uniform scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Scale(pub f32);

impl Attribute for Scale {
    const KEY: AttributeKey = AttributeKey(2);
    const NAME: &'static str = "scale";
}
