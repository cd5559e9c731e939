// crates/underwriting-core/src/schema.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    /// 可选：客户端传入；否则服务端生成
    #[serde(default)]
    pub document_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub user_id: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Approved,
    Denied,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Approved => "Approved",
            Status::Denied => "Denied",
        }
    }
}

/// One prediction per ensemble member; field names are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPredictions {
    pub random_forest: f64,
    pub gradient_boosting: f64,
    pub xgboost: f64,
    pub neural_network: f64,
}

impl ModelPredictions {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.random_forest,
            self.gradient_boosting,
            self.xgboost,
            self.neural_network,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingResult {
    pub status: Status,
    pub quotation: f64,
    pub confidence: f64,
    pub model_predictions: ModelPredictions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_wire_format() {
        let r = UnderwritingResult {
            status: Status::Approved,
            quotation: 12_000.0,
            confidence: 0.5,
            model_predictions: ModelPredictions {
                random_forest: 1.0,
                gradient_boosting: 2.0,
                xgboost: 3.0,
                neural_network: 4.0,
            },
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "Approved");
        assert_eq!(v["model_predictions"]["xgboost"], 3.0);
        assert_eq!(v["model_predictions"]["neural_network"], 4.0);
    }

    #[test]
    fn new_document_defaults() {
        let d: NewDocument = serde_json::from_str(r#"{"name":"payslip.pdf"}"#).unwrap();
        assert!(d.document_id.is_none());
        assert!(d.content.is_empty());
    }
}
