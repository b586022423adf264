use std::collections::HashMap;

use crate::error::BidError;
use crate::model::ScoringModel;
use crate::request::ModelKey;

/// Container for the trained models, keyed by advertiser
///
/// Every advertiser that can be bid for needs a CTR model. A CVR model is optional per advertiser.
/// The bid-price model is shared by all advertisers (it sees the key as its last feature).
pub struct ModelBank {
    ctr_models: HashMap<ModelKey, Box<dyn ScoringModel>>,
    cvr_models: HashMap<ModelKey, Box<dyn ScoringModel>>,
    bid_model: Box<dyn ScoringModel>,
}

impl ModelBank {
    pub fn new(bid_model: Box<dyn ScoringModel>) -> Self {
        Self {
            ctr_models: HashMap::new(),
            cvr_models: HashMap::new(),
            bid_model,
        }
    }

    /// Register the CTR model of an advertiser, replacing any previous one
    pub fn add_ctr_model(&mut self, key: ModelKey, model: Box<dyn ScoringModel>) {
        self.ctr_models.insert(key, model);
    }

    /// Register the CVR model of an advertiser, replacing any previous one
    pub fn add_cvr_model(&mut self, key: ModelKey, model: Box<dyn ScoringModel>) {
        self.cvr_models.insert(key, model);
    }

    /// CTR model for the key; a miss means the advertiser was never configured
    pub fn ctr_model(&self, key: &ModelKey) -> Result<&dyn ScoringModel, BidError> {
        self.ctr_models
            .get(key)
            .map(|model| model.as_ref())
            .ok_or_else(|| BidError::MissingCtrModel(key.clone()))
    }

    pub fn cvr_model(&self, key: &ModelKey) -> Option<&dyn ScoringModel> {
        self.cvr_models.get(key).map(|model| model.as_ref())
    }

    pub fn bid_model(&self) -> &dyn ScoringModel {
        self.bid_model.as_ref()
    }

    /// Advertisers with a CTR model, sorted
    pub fn keys(&self) -> Vec<&ModelKey> {
        let mut keys: Vec<&ModelKey> = self.ctr_models.keys().collect();
        keys.sort();
        keys
    }

    /// Advertisers with a CVR model that have no CTR model, and so can never be scored
    pub fn orphan_cvr_keys(&self) -> Vec<&ModelKey> {
        let mut keys: Vec<&ModelKey> = self
            .cvr_models
            .keys()
            .filter(|key| !self.ctr_models.contains_key(*key))
            .collect();
        keys.sort();
        keys
    }

    pub fn summary(&self) -> String {
        format!(
            "{} CTR models, {} CVR models, bid model: {}",
            self.ctr_models.len(),
            self.cvr_models.len(),
            self.bid_model.model_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConstantModel;

    fn key(id: &str) -> ModelKey {
        ModelKey::parse(id).unwrap()
    }

    fn bank() -> ModelBank {
        let mut bank = ModelBank::new(Box::new(ConstantModel { value: 80.0 }));
        bank.add_ctr_model(key("1458"), Box::new(ConstantModel { value: 0.9 }));
        bank.add_ctr_model(key("3358"), Box::new(ConstantModel { value: 0.8 }));
        bank.add_cvr_model(key("3358"), Box::new(ConstantModel { value: 0.75 }));
        bank.add_cvr_model(key("9999"), Box::new(ConstantModel { value: 0.75 }));
        bank
    }

    #[test]
    fn test_lookup_hits() {
        let bank = bank();
        assert_eq!(bank.ctr_model(&key("1458")).unwrap().predict(&[]).unwrap(), 0.9);
        assert!(bank.cvr_model(&key("3358")).is_some());
        assert!(bank.cvr_model(&key("1458")).is_none());
        assert_eq!(bank.bid_model().predict(&[]).unwrap(), 80.0);
    }

    #[test]
    fn test_missing_ctr_model_is_an_error() {
        let bank = bank();
        let err = bank.ctr_model(&key("3427")).err().unwrap();
        assert_eq!(err, BidError::MissingCtrModel(key("3427")));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_keys_and_orphans() {
        let bank = bank();
        assert_eq!(bank.keys(), vec![&key("1458"), &key("3358")]);
        assert_eq!(bank.orphan_cvr_keys(), vec![&key("9999")]);
        assert!(bank.summary().starts_with("2 CTR models, 2 CVR models"));
    }
}
