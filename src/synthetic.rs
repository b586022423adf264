use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, NormalError};

use crate::request::RawBidRequest;
use crate::sample::{SAMPLE_ADVERTISERS, SAMPLE_CREATIVES, SAMPLE_TAGS};
use crate::utils::{get_seed, lognormal_dist};

/// User agents seen in the logs the encoders were fitted on
const USER_AGENTS: [&str; 8] = [
    "mozilla/4.0 (compatible; msie 6.0; windows nt 5.1; sv1; qqdownload 718",
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/27.0.1453.94 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; rv:21.0) Gecko/20100101 Firefox/21.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_8_3) AppleWebKit/536.29.13 (KHTML, like Gecko) Version/6.0.4 Safari/536.29.13",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 6_1_4 like Mac OS X) AppleWebKit/536.26 (KHTML, like Gecko) Mobile/10B350",
    "Mozilla/5.0 (Linux; U; Android 4.0.4; zh-cn; MI-ONE Plus Build/IMM76D) AppleWebKit/534.30 Mobile Safari/534.30",
    "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1; Trident/4.0; SLCC2)",
    "Opera/9.80 (X11; Linux x86_64) Presto/2.12.388 Version/12.15",
];

/// Common slot sizes, width × height
const SLOT_SIZES: [(u32, u32); 9] = [
    (300, 250),
    (250, 250),
    (728, 90),
    (950, 90),
    (468, 60),
    (160, 600),
    (120, 600),
    (336, 280),
    (200, 200),
];

const REGIONS: [&str; 9] = ["0", "1", "2", "3", "80", "94", "146", "216", "393"];
/// A region the encoder has never seen; it encodes to the prior
const UNSEEN_REGION: &str = "999";
const CITIES: [&str; 8] = ["1", "2", "3", "85", "87", "107", "165", "217"];

/// Days of June 2013 covered by the training logs
const FIRST_DAY: u32 = 6;
const LAST_DAY: u32 = 12;

/// Parameters of the synthetic traffic
#[derive(Debug, Clone, Copy)]
pub struct TrafficParams {
    /// Share of slots with no floor price at all
    pub zero_floor_share: f64,
    pub floor_mean: f64,
    pub floor_stddev: f64,
    /// Share of requests from a region outside the fitted encoder
    pub unseen_region_share: f64,
    pub max_tags: usize,
}

impl Default for TrafficParams {
    fn default() -> Self {
        Self {
            zero_floor_share: 0.3,
            floor_mean: 40.0,
            floor_stddev: 30.0,
            unseen_region_share: 0.05,
            max_tags: 6,
        }
    }
}

/// Seeded generator of raw bid requests over the sample catalogue
pub struct RequestGenerator {
    rng: StdRng,
    floor_dist: LogNormal<f64>,
    params: TrafficParams,
    generated: u64,
}

impl RequestGenerator {
    /// Generator seeded from `RAND_SEED`; `offset` separates streams within one run
    pub fn new(params: TrafficParams, offset: u64) -> Result<Self, NormalError> {
        Ok(Self {
            rng: StdRng::seed_from_u64(get_seed(offset)),
            floor_dist: lognormal_dist(params.floor_mean, params.floor_stddev)?,
            params,
            generated: 0,
        })
    }

    fn timestamp(&mut self) -> String {
        let day = self.rng.gen_range(FIRST_DAY..=LAST_DAY);
        let hour = self.rng.gen_range(0..24);
        let minute = self.rng.gen_range(0..60);
        let second = self.rng.gen_range(0..60);
        let millis = self.rng.gen_range(0..1000);
        format!("201306{:02}{:02}{:02}{:02}{:03}", day, hour, minute, second, millis)
    }

    fn floor(&mut self) -> i64 {
        if self.rng.gen_bool(self.params.zero_floor_share) {
            0
        } else {
            self.floor_dist.sample(&mut self.rng).round() as i64
        }
    }

    fn user_tags(&mut self) -> String {
        let count = self.rng.gen_range(0..=self.params.max_tags.min(SAMPLE_TAGS.len()));
        let tags: Vec<&str> = SAMPLE_TAGS.choose_multiple(&mut self.rng, count).copied().collect();
        tags.join(",")
    }

    fn pick<'a>(&mut self, values: &'a [&'a str]) -> &'a str {
        values.choose(&mut self.rng).copied().unwrap_or_default()
    }

    /// Next raw request. Every field is filled with a well-formed value.
    pub fn next_request(&mut self) -> RawBidRequest {
        self.generated += 1;
        let (width, height) = SLOT_SIZES.choose(&mut self.rng).copied().unwrap_or((300, 250));
        let region = if self.rng.gen_bool(self.params.unseen_region_share) {
            UNSEEN_REGION
        } else {
            self.pick(&REGIONS)
        };
        let city = self.pick(&CITIES);
        let user_agent = self.pick(&USER_AGENTS);
        let creative = self.pick(&SAMPLE_CREATIVES);
        let advertiser = self.pick(&SAMPLE_ADVERTISERS);

        RawBidRequest {
            bid_id: Some(format!("synthetic-{:08}", self.generated)),
            timestamp: Some(self.timestamp()),
            visitor_id: Some(format!("visitor-{}", self.rng.gen_range(0..100_000))),
            user_agent: Some(user_agent.to_string()),
            ip_address: Some(format!("10.{}.{}.{}", self.rng.gen_range(0..256), self.rng.gen_range(0..256), self.rng.gen_range(1..255))),
            region: Some(region.to_string()),
            city: Some(city.to_string()),
            ad_exchange: Some(self.rng.gen_range(1..=4).to_string()),
            domain: Some(format!("domain-{}", self.rng.gen_range(0..500))),
            url: None,
            anonymous_url_id: None,
            ad_slot_id: Some(format!("slot-{}", self.rng.gen_range(0..10_000))),
            ad_slot_width: Some(width.to_string()),
            ad_slot_height: Some(height.to_string()),
            ad_slot_visibility: Some(self.rng.gen_range(0..=2).to_string()),
            ad_slot_format: Some(self.rng.gen_range(0..=1).to_string()),
            ad_slot_floor_price: Some(self.floor().to_string()),
            creative_id: Some(creative.to_string()),
            advertiser_id: Some(advertiser.to_string()),
            user_tags: Some(self.user_tags()),
        }
    }

    /// The next `n` requests
    pub fn take(&mut self, n: usize) -> Vec<RawBidRequest> {
        (0..n).map(|_| self.next_request()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::BidRequest;

    #[test]
    fn test_generated_requests_parse() {
        let mut generator = RequestGenerator::new(TrafficParams::default(), 1).unwrap();
        for raw in generator.take(500) {
            let request = BidRequest::parse(&raw).unwrap();
            let day = request.timestamp.day_of_month();
            assert!((FIRST_DAY..=LAST_DAY).contains(&day));
            assert!(request.ad_slot_floor_price >= 0);
            assert!(request.tags().count() <= 6);
        }
    }

    #[test]
    fn test_same_offset_same_stream() {
        let a = RequestGenerator::new(TrafficParams::default(), 42).unwrap().take(20);
        let b = RequestGenerator::new(TrafficParams::default(), 42).unwrap().take(20);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_floor_share() {
        let params = TrafficParams {
            zero_floor_share: 0.3,
            ..TrafficParams::default()
        };
        let mut generator = RequestGenerator::new(params, 3).unwrap();
        let n = 4000;
        let zeros = generator
            .take(n)
            .iter()
            .filter(|raw| raw.ad_slot_floor_price.as_deref() == Some("0"))
            .count();
        let share = zeros as f64 / n as f64;
        assert!((share - 0.3).abs() < 0.05, "zero floor share {}", share);
    }
}
