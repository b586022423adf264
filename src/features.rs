/// Feature Transformer: turns one typed `BidRequest` into the fixed-order numeric vector the
/// scoring models were trained on, plus the model key and the floor price.
///
/// The derivations are:
/// - slot width and height in hundreds of pixels
/// - the creative's user count summed over the request's user tags
/// - the 15-minute time block of the day and the calendar day
/// - device, browser and ad type categories from the user agent and slot geometry
/// Six categorical values go through the fitted target encoder (then × 100) and the creative user
/// count goes through the fitted min-max scaler.

use std::fmt;

use crate::encoders::EncoderBundle;
use crate::error::TransformError;
use crate::logger::{LogEvent, Logger};
use crate::lookup::LookupTables;
use crate::request::{BidRequest, ModelKey};
use crate::{logln, warnln};

/// Number of features produced per request
pub const FEATURE_COUNT: usize = 13;

/// Feature names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "region",
    "city",
    "exchange",
    "width",
    "height",
    "visibility",
    "format",
    "creative_user_count",
    "time_block",
    "day_of_week",
    "device",
    "browser",
    "ad_type",
];

/// Columns the target encoder must have been fitted on
pub const CATEGORICAL_COLUMNS: [&str; 6] = ["region", "city", "device", "browser", "ad_type", "day_of_week"];

/// Columns the min-max scaler must have been fitted on
pub const NUMERIC_COLUMNS: [&str; 2] = ["creative_user_count", "time_block"];

/// Slot dimensions are fed to the models in hundreds of pixels
const DIMENSION_SCALE: f64 = 100.0;

/// Target-encoded values are multiplied by this before entering the vector
const ENCODED_SCALE: f64 = 100.0;

/// One classification rule: the label applies if any token is a substring of the input
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub tokens: &'static [&'static str],
    pub label: &'static str,
}

/// Device rules, in priority order. Android user agents also mention linux and
/// resolve to `linux`, which is what the encoder was fitted on.
pub const DEVICE_RULES: &[ClassificationRule] = &[
    ClassificationRule { tokens: &["ios", "iphone", "ipad", "ipod"], label: "ios" },
    ClassificationRule { tokens: &["macintosh", "mac", "darwin"], label: "mac" },
    ClassificationRule { tokens: &["windows"], label: "windows" },
    ClassificationRule { tokens: &["linux"], label: "linux" },
    ClassificationRule { tokens: &["android"], label: "android" },
];

/// Browser rules, in priority order. Chrome user agents also mention safari.
pub const BROWSER_RULES: &[ClassificationRule] = &[
    ClassificationRule { tokens: &["safari"], label: "safari" },
    ClassificationRule { tokens: &["chrome"], label: "chrome" },
    ClassificationRule { tokens: &["firefox", "mozilla"], label: "firefox" },
    ClassificationRule { tokens: &["edge"], label: "edge" },
    ClassificationRule { tokens: &["msie", "trident"], label: "ie" },
];

/// Label used when no rule matches
pub const OTHER_LABEL: &str = "other";

/// Return the label of the first rule with a token contained in `user_agent` (already lower-cased)
pub fn classify(rules: &[ClassificationRule], user_agent: &str) -> &'static str {
    rules
        .iter()
        .find(|rule| rule.tokens.iter().any(|token| user_agent.contains(token)))
        .map(|rule| rule.label)
        .unwrap_or(OTHER_LABEL)
}

/// Ad slot shape derived from its width/height ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdType {
    Banner,
    Rectangle,
    Square,
    Vertical,
    Other,
}

impl AdType {
    /// Bands are checked in order: banner, rectangle, square, vertical, then other.
    /// Ratios in [2, 3] and undefined ratios (0×0 slots) fall through to `Other`.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let width = f64::from(width);
        let height = f64::from(height);
        let ratio = width / height;
        if ratio > 3.0 {
            AdType::Banner
        } else if 1.2 < ratio && ratio < 2.0 {
            AdType::Rectangle
        } else if (0.8..=1.2).contains(&ratio) {
            AdType::Square
        } else if height / width > 1.2 {
            AdType::Vertical
        } else {
            AdType::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdType::Banner => "banner",
            AdType::Rectangle => "rectangle",
            AdType::Square => "square",
            AdType::Vertical => "vertical",
            AdType::Other => "other",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The 13-element model input, in `FEATURE_NAMES` order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The vector followed by the numeric model key, as the CVR and bid-price models expect
    pub fn extended_with(&self, key: &ModelKey) -> Vec<f64> {
        let mut extended = Vec::with_capacity(FEATURE_COUNT + 1);
        extended.extend_from_slice(&self.0);
        extended.push(key.as_feature());
        extended
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES.iter().position(|n| *n == name).map(|i| self.0[i])
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = FEATURE_NAMES
            .iter()
            .zip(self.0.iter())
            .map(|(name, value)| format!("{}={:.4}", name, value))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Intermediate, human-readable derivations (before encoding)
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedCategories {
    pub device: &'static str,
    pub browser: &'static str,
    pub ad_type: AdType,
    pub day: String,
    pub time_block: u32,
    pub creative_user_count: i64,
}

/// Output of the transformer
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRequest {
    pub features: FeatureVector,
    pub model_key: ModelKey,
    pub floor_price: i64,
}

/// Stateless transformer over borrowed, load-once artifacts
#[derive(Clone, Copy)]
pub struct FeatureTransformer<'a> {
    encoders: &'a EncoderBundle,
    lookups: &'a LookupTables,
}

impl<'a> FeatureTransformer<'a> {
    pub fn new(encoders: &'a EncoderBundle, lookups: &'a LookupTables) -> Self {
        Self { encoders, lookups }
    }

    /// Derive the raw categories and counts of a request
    pub fn derive(&self, request: &BidRequest) -> Result<DerivedCategories, TransformError> {
        let user_agent = request.user_agent.to_lowercase();
        let creative_user_count = self.lookups.creative_tags.user_count(&request.creative_id, request.tags())?;
        Ok(DerivedCategories {
            device: classify(DEVICE_RULES, &user_agent),
            browser: classify(BROWSER_RULES, &user_agent),
            ad_type: AdType::from_dimensions(request.ad_slot_width, request.ad_slot_height),
            day: request.timestamp.day_of_month().to_string(),
            time_block: request.timestamp.time_block(),
            creative_user_count,
        })
    }

    /// Produce the feature vector, model key and floor price for a request
    pub fn transform(&self, request: &BidRequest, logger: &mut Logger) -> Result<TransformedRequest, TransformError> {
        let derived = self.derive(request)?;

        if let Some(booked) = self.lookups.creative_bias.ad_type(&request.creative_id) {
            if booked != derived.ad_type.label() {
                warnln!(logger, LogEvent::Request,
                    "bid {}: creative {} is booked as {} but the slot is {}",
                    request.bid_id, request.creative_id, booked, derived.ad_type);
            }
        }

        let target = &self.encoders.target_encoder;
        let encode = |column: &str, value: &str| -> Result<f64, TransformError> {
            Ok(target.encode(column, value)? * ENCODED_SCALE)
        };
        let region = encode("region", request.region.as_str())?;
        let city = encode("city", request.city.as_str())?;
        let device = encode("device", derived.device)?;
        let browser = encode("browser", derived.browser)?;
        let ad_type = encode("ad_type", derived.ad_type.label())?;
        let day = encode("day_of_week", derived.day.as_str())?;

        let scaler = &self.encoders.scaler;
        let creative_user_count = scaler.transform("creative_user_count", derived.creative_user_count as f64)?;
        // The models were trained on the raw bucket; the scaled value is only logged
        let scaled_time_block = scaler.transform("time_block", f64::from(derived.time_block))?;

        let features = FeatureVector::new([
            region,
            city,
            request.ad_exchange as f64,
            f64::from(request.ad_slot_width) / DIMENSION_SCALE,
            f64::from(request.ad_slot_height) / DIMENSION_SCALE,
            request.ad_slot_visibility as f64,
            request.ad_slot_format as f64,
            creative_user_count,
            f64::from(derived.time_block),
            day,
            device,
            browser,
            ad_type,
        ]);

        logln!(logger, LogEvent::Request,
            "bid {}: device={} browser={} ad_type={} day={} time_block={} (scaled {:.4}) creative_user_count={}",
            request.bid_id, derived.device, derived.browser, derived.ad_type, derived.day,
            derived.time_block, scaled_time_block, derived.creative_user_count);
        logln!(logger, LogEvent::Request, "bid {}: features {}", request.bid_id, features);

        Ok(TransformedRequest {
            features,
            model_key: request.advertiser_id.clone(),
            floor_price: request.ad_slot_floor_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::capture::capture;
    use crate::request::RawBidRequest;
    use crate::sample;

    fn parse(raw: &RawBidRequest) -> BidRequest {
        BidRequest::parse(raw).unwrap()
    }

    #[test]
    fn test_device_priority() {
        let cases = [
            ("mozilla/5.0 (iphone; cpu iphone os 6_1 like mac os x)", "ios"),
            ("mozilla/5.0 (macintosh; intel mac os x 10_8_3)", "mac"),
            ("mozilla/4.0 (compatible; msie 6.0; windows nt 5.1; sv1)", "windows"),
            ("mozilla/5.0 (x11; linux x86_64)", "linux"),
            ("mozilla/5.0 (linux; u; android 4.0.4)", "linux"),
            ("dalvik/1.6.0 (android 4.1)", "android"),
            ("opera/9.80 (j2me/midp)", "other"),
        ];
        for (ua, expected) in cases {
            assert_eq!(classify(DEVICE_RULES, ua), expected, "{}", ua);
        }
    }

    #[test]
    fn test_browser_priority() {
        let cases = [
            ("mozilla/5.0 applewebkit/537.31 chrome/26.0 safari/537.31", "safari"),
            ("chrome/26.0", "chrome"),
            ("mozilla/5.0 (windows nt 6.1; rv:20.0) gecko firefox/20.0", "firefox"),
            ("mozilla/4.0 (compatible; msie 6.0; windows nt 5.1)", "firefox"),
            ("opera/9.80 edge/12", "edge"),
            ("(compatible; msie 8.0; trident/4.0)", "ie"),
            ("curl/7.29", "other"),
        ];
        for (ua, expected) in cases {
            assert_eq!(classify(BROWSER_RULES, ua), expected, "{}", ua);
        }
    }

    #[test]
    fn test_ad_type_bands() {
        assert_eq!(AdType::from_dimensions(728, 90), AdType::Banner);
        assert_eq!(AdType::from_dimensions(336, 200), AdType::Rectangle);
        assert_eq!(AdType::from_dimensions(250, 250), AdType::Square);
        assert_eq!(AdType::from_dimensions(160, 600), AdType::Vertical);
        assert_eq!(AdType::from_dimensions(500, 200), AdType::Other);
    }

    #[test]
    fn test_ad_type_boundaries() {
        // exactly 3: not > 3, not a rectangle, not square, h/w = 0.33
        assert_eq!(AdType::from_dimensions(300, 100), AdType::Other);
        // exactly 2: the rectangle band is open at 2
        assert_eq!(AdType::from_dimensions(200, 100), AdType::Other);
        // exactly 1.2 (300x250): the rectangle band is open at 1.2, square is closed
        assert_eq!(AdType::from_dimensions(300, 250), AdType::Square);
        assert_eq!(AdType::from_dimensions(120, 100), AdType::Square);
        // exactly 0.8: square is closed at 0.8
        assert_eq!(AdType::from_dimensions(80, 100), AdType::Square);
        // just under 0.8 is already taller than 1.2
        assert_eq!(AdType::from_dimensions(79, 100), AdType::Vertical);
    }

    #[test]
    fn test_ad_type_is_total() {
        let mut seen = std::collections::HashSet::new();
        for width in (0..=1000).step_by(10) {
            for height in (0..=1000).step_by(10) {
                seen.insert(AdType::from_dimensions(width, height));
            }
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(AdType::from_dimensions(0, 0), AdType::Other);
        assert_eq!(AdType::from_dimensions(300, 0), AdType::Banner);
        assert_eq!(AdType::from_dimensions(0, 300), AdType::Vertical);
    }

    #[test]
    fn test_sample_request_vector() {
        let bundle = sample::sample_bundle().unwrap();
        let transformer = FeatureTransformer::new(&bundle.encoders, &bundle.lookups);
        let mut logger = Logger::new();
        let request = parse(&sample::sample_raw_request());

        let derived = transformer.derive(&request).unwrap();
        assert_eq!(derived.device, "windows");
        assert_eq!(derived.browser, "firefox");
        assert_eq!(derived.ad_type, AdType::Square);
        assert_eq!(derived.day, "6");
        assert_eq!(derived.time_block, 0);
        assert_eq!(derived.creative_user_count, 0);

        let out = transformer.transform(&request, &mut logger).unwrap();
        assert_eq!(out.features.len(), FEATURE_COUNT);
        assert_eq!(out.features.as_slice().len(), 13);
        assert_eq!(out.model_key.as_str(), "3427");
        assert_eq!(out.floor_price, 0);

        let target = &bundle.encoders.target_encoder;
        let expected_region = target.encode("region", "80").unwrap() * 100.0;
        assert_eq!(out.features.get("region"), Some(expected_region));
        assert_eq!(out.features.get("exchange"), Some(1.0));
        assert_eq!(out.features.get("width"), Some(3.0));
        assert_eq!(out.features.get("height"), Some(2.5));
        assert_eq!(out.features.get("visibility"), Some(1.0));
        assert_eq!(out.features.get("format"), Some(1.0));
        assert_eq!(out.features.get("time_block"), Some(0.0));
        assert_eq!(out.features.get("device"), Some(target.encode("device", "windows").unwrap() * 100.0));
        assert_eq!(out.features.get("ad_type"), Some(target.encode("ad_type", "square").unwrap() * 100.0));
        assert_eq!(out.features.get("day_of_week"), Some(target.encode("day_of_week", "6").unwrap() * 100.0));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let bundle = sample::sample_bundle().unwrap();
        let transformer = FeatureTransformer::new(&bundle.encoders, &bundle.lookups);
        let mut logger = Logger::new();
        let request = parse(&sample::sample_raw_request());
        let first = transformer.transform(&request, &mut logger).unwrap();
        let second = transformer.transform(&request, &mut logger).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_creative_user_count_is_scaled() {
        let bundle = sample::sample_bundle().unwrap();
        let transformer = FeatureTransformer::new(&bundle.encoders, &bundle.lookups);
        let mut logger = Logger::new();
        let mut raw = sample::sample_raw_request();
        raw.user_tags = Some(sample::SAMPLE_TAGS.join(","));
        let request = parse(&raw);

        let derived = transformer.derive(&request).unwrap();
        assert!(derived.creative_user_count > 0);

        let out = transformer.transform(&request, &mut logger).unwrap();
        let expected = bundle
            .encoders
            .scaler
            .transform("creative_user_count", derived.creative_user_count as f64)
            .unwrap();
        assert_eq!(out.features.get("creative_user_count"), Some(expected));
    }

    #[test]
    fn test_unknown_creative_fails_transform() {
        let bundle = sample::sample_bundle().unwrap();
        let transformer = FeatureTransformer::new(&bundle.encoders, &bundle.lookups);
        let mut logger = Logger::new();
        let mut raw = sample::sample_raw_request();
        raw.creative_id = Some("not-a-creative".to_string());
        let request = parse(&raw);
        assert_eq!(
            transformer.transform(&request, &mut logger),
            Err(TransformError::UnknownCreative("not-a-creative".to_string()))
        );
    }

    #[test]
    fn test_booked_ad_type_mismatch_warns() {
        let bundle = sample::sample_bundle().unwrap();
        let transformer = FeatureTransformer::new(&bundle.encoders, &bundle.lookups);
        let mut logger = Logger::new();
        let (_, captured) = capture(&mut logger, vec![LogEvent::Request]);

        // Booked as square on a 300x250 slot
        transformer.transform(&parse(&sample::sample_raw_request()), &mut logger).unwrap();
        assert!(!captured.borrow().contains("WARNING"));

        // Booked as banner on the same slot
        let mut raw = sample::sample_raw_request();
        raw.creative_id = Some("0055e8503dc053435b3599fe44af118b".to_string());
        let out = transformer.transform(&parse(&raw), &mut logger).unwrap();
        assert_eq!(out.features.get("ad_type"),
            Some(bundle.encoders.target_encoder.encode("ad_type", "square").unwrap() * 100.0));

        let log = captured.borrow();
        let warning = log.lines().find(|line| line.starts_with("WARNING")).unwrap();
        assert!(warning.contains("creative 0055e8503dc053435b3599fe44af118b is booked as banner but the slot is square"));
    }

    #[test]
    fn test_scaled_time_block_is_logged_not_fed() {
        let bundle = sample::sample_bundle().unwrap();
        let transformer = FeatureTransformer::new(&bundle.encoders, &bundle.lookups);
        let mut logger = Logger::new();
        let (_, captured) = capture(&mut logger, vec![LogEvent::Request]);

        let mut raw = sample::sample_raw_request();
        raw.timestamp = Some("20130606190004008".to_string());
        let out = transformer.transform(&parse(&raw), &mut logger).unwrap();

        assert_eq!(out.features.get("time_block"), Some(76.0));
        assert!(captured.borrow().contains("time_block=76 (scaled 0.8000)"));
    }

    #[test]
    fn test_time_block_requires_fitted_scaler() {
        let mut bundle = sample::sample_bundle().unwrap();
        bundle.encoders.scaler.columns.remove("time_block");
        let transformer = FeatureTransformer::new(&bundle.encoders, &bundle.lookups);
        let mut logger = Logger::new();
        let result = transformer.transform(&parse(&sample::sample_raw_request()), &mut logger);
        assert!(matches!(result, Err(TransformError::UnfittedColumn { column, .. }) if column == "time_block"));
    }

    #[test]
    fn test_extended_vector_appends_key() {
        let features = FeatureVector::new([1.0; FEATURE_COUNT]);
        let key = ModelKey::parse("3358").unwrap();
        let extended = features.extended_with(&key);
        assert_eq!(extended.len(), FEATURE_COUNT + 1);
        assert_eq!(extended[FEATURE_COUNT], 3358.0);
        assert_eq!(&extended[..FEATURE_COUNT], features.as_slice());
    }
}
