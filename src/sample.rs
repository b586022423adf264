/// Sample artifacts and the reference request, embedded from `demos/artifacts/`.
///
/// The artifacts are small hand-fitted stand-ins for the training pipeline output: same shapes,
/// same advertiser keys, plausible magnitudes. Scenarios, charts and tests score against them.

use std::path::PathBuf;

use serde::de::DeserializeOwned;

use crate::artifacts::ArtifactBundle;
use crate::config::BidderConfig;
use crate::encoders::EncoderBundle;
use crate::error::LoadError;
use crate::lookup::{CreativeBias, CreativeTagCounts, LookupTables};
use crate::model::ModelArtifact;
use crate::model_bank::ModelBank;
use crate::request::{ModelKey, RawBidRequest};

/// Creative of the reference request
pub const SAMPLE_CREATIVE: &str = "00fccc64a1ee2809348509b7ac2a97a5";

/// Creatives present in the sample creative tables
pub const SAMPLE_CREATIVES: [&str; 8] = [
    "00fccc64a1ee2809348509b7ac2a97a5",
    "0055e8503dc053435b3599fe44af118b",
    "011c1a3d4d3f089a54f9b70a4c0a6eb3",
    "0cd33fcb336655841d3e1441b915748d",
    "1a43f1ff53f48573803d4a3c31ebc163",
    "2f88fc9cf0141b5bbaf251cab07f4ce7",
    "3b805a00d99d5ee2493c8fb0063e30e9",
    "47905feeb59223468fb898b3c9ac024d",
];

/// User tag codes that appear in the sample creative tables
pub const SAMPLE_TAGS: [&str; 16] = [
    "10006", "10024", "10031", "10048", "10052", "10057", "10059", "10063",
    "10077", "10079", "10083", "10093", "10102", "10684", "11092", "13042",
];

/// Advertisers with a CTR model in the sample bundle
pub const SAMPLE_ADVERTISERS: [&str; 5] = ["1458", "3358", "3386", "3427", "3476"];

const CONFIG: (&str, &str) = ("config.json", include_str!("../demos/artifacts/config.json"));
const REQUEST: (&str, &str) = ("request.json", include_str!("../demos/artifacts/request.json"));
const ENCODERS: (&str, &str) = ("saved/encoders_scalers.json", include_str!("../demos/artifacts/saved/encoders_scalers.json"));
const CREATIVE_COUNTS: (&str, &str) = ("saved/creative_userid_count.json", include_str!("../demos/artifacts/saved/creative_userid_count.json"));
const CREATIVE_BIAS: (&str, &str) = ("saved/creative_adtype_map.json", include_str!("../demos/artifacts/saved/creative_adtype_map.json"));
const BID_MODEL: (&str, &str) = ("model/bid.json", include_str!("../demos/artifacts/model/bid.json"));
const CTR_MODELS: [(&str, &str, &str); 5] = [
    ("1458", "model/1458.json", include_str!("../demos/artifacts/model/1458.json")),
    ("3358", "model/3358.json", include_str!("../demos/artifacts/model/3358.json")),
    ("3386", "model/3386.json", include_str!("../demos/artifacts/model/3386.json")),
    ("3427", "model/3427.json", include_str!("../demos/artifacts/model/3427.json")),
    ("3476", "model/3476.json", include_str!("../demos/artifacts/model/3476.json")),
];
const CVR_MODELS: [(&str, &str, &str); 2] = [
    ("3358", "model/3358_cvr.json", include_str!("../demos/artifacts/model/3358_cvr.json")),
    ("3476", "model/3476_cvr.json", include_str!("../demos/artifacts/model/3476_cvr.json")),
];

fn parse<T: DeserializeOwned>((name, text): (&str, &str)) -> Result<T, LoadError> {
    serde_json::from_str(text).map_err(|source| LoadError::Json {
        path: PathBuf::from("demos/artifacts").join(name),
        source,
    })
}

fn parse_model(name: &str, text: &str) -> Result<Box<dyn crate::model::ScoringModel>, LoadError> {
    let artifact: ModelArtifact = parse((name, text))?;
    artifact.into_model().map_err(|source| LoadError::InvalidModel {
        path: PathBuf::from("demos/artifacts").join(name),
        source,
    })
}

fn key(id: &str) -> Result<ModelKey, LoadError> {
    ModelKey::parse(id).map_err(|e| LoadError::InvalidConfig(e.to_string()))
}

/// The sample configuration (thresholds only; artifact paths are relative to `demos/artifacts`)
pub fn sample_config() -> Result<BidderConfig, LoadError> {
    parse(CONFIG)
}

/// The sample bundle, identical to loading `demos/artifacts/config.json` from disk
pub fn sample_bundle() -> Result<ArtifactBundle, LoadError> {
    let encoders: EncoderBundle = parse(ENCODERS)?;
    let creative_tags: CreativeTagCounts = parse(CREATIVE_COUNTS)?;
    let creative_bias: CreativeBias = parse(CREATIVE_BIAS)?;

    let mut models = ModelBank::new(parse_model(BID_MODEL.0, BID_MODEL.1)?);
    for (id, name, text) in CTR_MODELS {
        models.add_ctr_model(key(id)?, parse_model(name, text)?);
    }
    for (id, name, text) in CVR_MODELS {
        models.add_cvr_model(key(id)?, parse_model(name, text)?);
    }

    ArtifactBundle::new(encoders, LookupTables { creative_tags, creative_bias }, models)
}

/// The reference request: advertiser 3427, a 300x250 slot, no floor, no user tags
pub fn sample_raw_request() -> RawBidRequest {
    RawBidRequest {
        bid_id: Some("b382c1c156dcbbd5b9317cb50f6a747b".to_string()),
        timestamp: Some("20130606000104008".to_string()),
        visitor_id: Some("Vh16OwT6OQNUXbj".to_string()),
        user_agent: Some("mozilla/4.0 (compatible; msie 6.0; windows nt 5.1; sv1; qqdownload 718".to_string()),
        ip_address: Some("192.168.0.1".to_string()),
        region: Some("80".to_string()),
        city: Some("87".to_string()),
        ad_exchange: Some("1".to_string()),
        domain: Some("tFKETuqyMo1mjMp45SqfNX".to_string()),
        url: Some("249b2c34247d400ef1cd3c6bfda4f12a".to_string()),
        anonymous_url_id: None,
        ad_slot_id: Some("mm_11402872_1272384_3182279".to_string()),
        ad_slot_width: Some("300".to_string()),
        ad_slot_height: Some("250".to_string()),
        ad_slot_visibility: Some("1".to_string()),
        ad_slot_format: Some("1".to_string()),
        ad_slot_floor_price: Some("0".to_string()),
        creative_id: Some(SAMPLE_CREATIVE.to_string()),
        advertiser_id: Some("3427".to_string()),
        user_tags: Some(String::new()),
    }
}

/// The reference request as shipped in `demos/artifacts/request.json`
pub fn sample_request_json() -> Result<RawBidRequest, LoadError> {
    parse(REQUEST)
}
