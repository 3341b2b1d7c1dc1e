use failure::Error;
use failure_derive::Fail;

pub type CResult<T> = Result<T, Error>;
pub type CError = Error;

/// Failures raised by the layer before any computation takes place. Numeric
/// issues (overflow, NaN) are not detected and propagate to the caller.
#[derive(Debug, Fail)]
pub enum LayerError {
    #[fail(
        display = "shape mismatch for `{}`: expected {:?}, got {:?}",
        tensor, expected, actual
    )]
    ShapeMismatch {
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[fail(display = "invalid layer configuration: {}", _0)]
    InvalidConfig(String),
}

pub(crate) fn ensure_shape(
    tensor: &'static str,
    expected: &[usize],
    actual: &[usize],
) -> CResult<()> {
    if expected != actual {
        return Err(LayerError::ShapeMismatch {
            tensor,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_names_the_offending_tensor() {
        let err = ensure_shape("grad_output", &[2, 3], &[3, 2]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("`grad_output`"));
        assert!(msg.contains("[2, 3]"));
        assert!(msg.contains("[3, 2]"));
    }

    #[test]
    fn test_matching_shapes_pass() {
        assert!(ensure_shape("input", &[1, 4, 4], &[1, 4, 4]).is_ok());
    }
}
