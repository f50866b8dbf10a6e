use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware-accelerated ONNX execution providers for the current platform,
/// in preference order. ONNX Runtime falls back to CPU when none of them
/// can be registered, so an empty list means CPU only.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    let providers: Vec<ExecutionProviderDispatch> = platform_providers();
    log::debug!("Requesting {} accelerated execution provider(s)", providers.len());
    providers
}

#[cfg(target_os = "macos")]
fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
}

#[cfg(target_os = "windows")]
fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    Vec::new()
}
