//! Backend abstraction - Multi-backend support
//!
//! NdArray (CPU) is the default backend. The `cuda` and `wgpu` features swap
//! in a GPU backend; `cuda` wins when both are enabled.

use burn::backend::Autodiff;

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA, WGPU, or NdArray (default)
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "wgpu"))]
pub type DefaultBackend = burn_wgpu::Wgpu;

#[cfg(all(not(feature = "cuda"), not(feature = "wgpu")))]
pub type DefaultBackend = burn_ndarray::NdArray;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    <DefaultBackend as burn::tensor::backend::Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "wgpu"))]
    {
        "WGPU (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), not(feature = "wgpu")))]
    {
        "NdArray (CPU)"
    }
}
