use lifecore::{KernelError, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Params {
    params: Vec<String>,
}

/// Packs step parameters into the `{"params": [..]}` outcome document.
pub fn bundle<S: AsRef<str>>(params: &[S]) -> Result<String> {
    let params = Params {
        params: params.iter().map(|p| p.as_ref().to_string()).collect(),
    };
    Ok(serde_json::to_string(&params)?)
}

pub fn unbundle(payload: &str) -> Result<Vec<String>> {
    let params: Params = serde_json::from_str(payload)
        .map_err(|e| KernelError::invalid(format!("Could not read step parameters: {}", e)))?;
    Ok(params.params)
}

/// Parameters of `step`, which takes exactly `count` of them.
pub(crate) fn expect(step: &str, payload: &str, count: usize) -> Result<Vec<String>> {
    let params = unbundle(payload)?;
    if params.len() != count {
        return Err(KernelError::invalid(format!(
            "{} takes {} parameters, got {}",
            step,
            count,
            params.len()
        )));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_params_read_back() {
        let payload = bundle(&["Status", "Closed"]).unwrap();
        assert_eq!(payload, r#"{"params":["Status","Closed"]}"#);
        assert_eq!(unbundle(&payload).unwrap(), vec!["Status", "Closed"]);
    }

    #[test]
    fn wrong_count_or_shape_is_invalid() {
        assert!(matches!(expect("WriteProperty", r#"{"params":["a"]}"#, 2), Err(KernelError::InvalidData(_))));
        assert!(matches!(unbundle("<params/>"), Err(KernelError::InvalidData(_))));
    }
}
