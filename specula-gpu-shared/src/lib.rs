//! GPU-side data shared by the Specula SSR crates: uniform block layouts and
//! the shader-stage contract (pass indices, kernel names, binding slots).

pub mod shaders;
pub mod uniforms;
