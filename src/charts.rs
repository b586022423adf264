use bidprice::engine::{BidDecision, BidEngine, DecisionPolicy};
use bidprice::logger::Logger;
use bidprice::request::BidRequest;
use bidprice::sample;
use bidprice::synthetic::{RequestGenerator, TrafficParams};
use plotters::prelude::*;
use std::fs;

const NUM_REQUESTS: usize = 10000;
const NUM_BINS: usize = 50;

/// Scored synthetic traffic, collected once for all charts
#[derive(Default)]
struct ScoredTraffic {
    bid_prices: Vec<f64>,
    base_prices: Vec<f64>,
    /// Final price over floor, for bids on slots with a positive floor
    floor_ratios: Vec<f64>,
    floors: Vec<f64>,
    ctrs: Vec<f64>,
    cvrs: Vec<f64>,
    time_blocks: Vec<f64>,
}

fn score_synthetic_traffic(policy: DecisionPolicy) -> Result<ScoredTraffic, Box<dyn std::error::Error>> {
    let bundle = sample::sample_bundle()?;
    let engine = BidEngine::new(&bundle, policy);
    let mut generator = RequestGenerator::new(TrafficParams::default(), 0)?;
    let mut logger = Logger::new();
    let mut traffic = ScoredTraffic::default();

    for raw in generator.take(NUM_REQUESTS) {
        let request = BidRequest::parse(&raw)?;
        let floor = request.ad_slot_floor_price as f64;
        traffic.floors.push(floor);
        traffic.time_blocks.push(f64::from(request.timestamp.time_block()));

        match engine.decide(&request, &mut logger)? {
            BidDecision::Bid { price, base_price, ctr, cvr, .. } => {
                traffic.bid_prices.push(price);
                traffic.base_prices.push(base_price);
                traffic.ctrs.push(ctr);
                traffic.cvrs.extend(cvr);
                if floor > 0.0 {
                    traffic.floor_ratios.push(price / floor);
                }
            }
            BidDecision::Abstain { ctr } => traffic.ctrs.push(ctr),
        }
    }
    Ok(traffic)
}

/// Fixed-width bins over the range of the values and of any reference markers
struct Histogram {
    min: f64,
    max: f64,
    bin_width: f64,
    counts: Vec<u32>,
    mean: f64,
    len: usize,
}

impl Histogram {
    fn new(values: &[f64], markers: &[Marker], num_bins: usize) -> Option<Self> {
        if values.is_empty() || num_bins == 0 {
            return None;
        }

        let points = values.iter().chain(markers.iter().map(|m| &m.at));
        let min = points.clone().copied().fold(f64::INFINITY, f64::min);
        let mut max = points.copied().fold(f64::NEG_INFINITY, f64::max);
        if max <= min {
            max = min + 1.0;
        }
        let bin_width = (max - min) / num_bins as f64;

        let mut counts = vec![0u32; num_bins];
        for &value in values {
            let bin = (((value - min) / bin_width).floor() as usize).min(num_bins - 1);
            counts[bin] += 1;
        }

        Some(Self {
            min,
            max,
            bin_width,
            counts,
            mean: values.iter().sum::<f64>() / values.len() as f64,
            len: values.len(),
        })
    }

    fn peak(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// (low edge, high edge, count) per bin
    fn bars(&self) -> impl Iterator<Item = (f64, f64, u32)> + '_ {
        self.counts.iter().enumerate().map(move |(i, &count)| {
            let low = self.min + i as f64 * self.bin_width;
            (low, low + self.bin_width, count)
        })
    }

    /// Share of the values at or above `threshold`, at bin resolution
    fn share_from(&self, threshold: f64) -> f64 {
        let above: u32 = self.bars().filter(|&(low, _, _)| low >= threshold).map(|(_, _, c)| c).sum();
        f64::from(above) / self.len as f64
    }
}

/// Vertical reference line drawn across a histogram
struct Marker {
    at: f64,
    label: String,
    color: RGBColor,
}

impl Marker {
    fn new(at: f64, label: impl Into<String>, color: RGBColor) -> Self {
        Self { at, label: label.into(), color }
    }
}

struct ChartSpec<'a> {
    title: &'a str,
    filename: &'a str,
    x_label: &'a str,
    color: RGBColor,
}

/// Main function to generate all histograms
pub fn generate_all_histograms() -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all("charts")?;

    let policy = DecisionPolicy::default();
    let traffic = score_synthetic_traffic(policy)?;
    println!("Scored {} requests, {} bids", NUM_REQUESTS, traffic.bid_prices.len());

    let charts = [
        (ChartSpec { title: "Bid Price Distribution", filename: "charts/bid_price_histogram.png", x_label: "Bid Price", color: BLUE },
            &traffic.bid_prices, vec![]),
        (ChartSpec { title: "Base Price Distribution", filename: "charts/base_price_histogram.png", x_label: "Base Price", color: GREEN },
            &traffic.base_prices, vec![]),
        (ChartSpec { title: "Bid Price over Floor", filename: "charts/floor_ratio_histogram.png", x_label: "Bid Price / Floor", color: BLUE },
            &traffic.floor_ratios,
            vec![Marker::new(policy.floor_markup, format!("Floor markup: {}", policy.floor_markup), RED)]),
        (ChartSpec { title: "Floor Price Distribution", filename: "charts/floor_price_histogram.png", x_label: "Floor Price", color: RED },
            &traffic.floors, vec![]),
        (ChartSpec { title: "Predicted CTR Distribution", filename: "charts/ctr_histogram.png", x_label: "CTR", color: MAGENTA },
            &traffic.ctrs,
            vec![Marker::new(policy.ctr_threshold, format!("Bid above: {}", policy.ctr_threshold), RED)]),
        (ChartSpec { title: "Predicted CVR Distribution", filename: "charts/cvr_histogram.png", x_label: "CVR", color: GREEN },
            &traffic.cvrs,
            vec![Marker::new(policy.cvr_threshold, format!("x{} above: {}", policy.cvr_multiplier, policy.cvr_threshold), RED)]),
        (ChartSpec { title: "Time Block Distribution", filename: "charts/time_block_histogram.png", x_label: "Time Block (15 min)", color: CYAN },
            &traffic.time_blocks, vec![]),
    ];

    for (spec, values, markers) in &charts {
        draw_histogram(spec, values, markers)?;
    }

    Ok(())
}

/// Draw one histogram with its mean and any reference markers
fn draw_histogram(spec: &ChartSpec, values: &[f64], markers: &[Marker]) -> Result<(), Box<dyn std::error::Error>> {
    let histogram = Histogram::new(values, markers, NUM_BINS)
        .ok_or_else(|| format!("Cannot create histogram {}: dataset is empty", spec.filename))?;
    let peak = histogram.peak();

    let root = BitMapBackend::new(spec.filename, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(spec.title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(histogram.min..histogram.max, 0u32..peak + peak / 10 + 1)?;

    chart.configure_mesh()
        .x_desc(spec.x_label)
        .y_desc("Requests")
        .draw()?;

    let fill = spec.color.filled();
    chart.draw_series(histogram.bars().map(|(low, high, count)| Rectangle::new([(low, 0), (high, count)], fill)))?
        .label(format!("n={}", histogram.len))
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], fill));

    let vertical = |at: f64| PathElement::new(vec![(at, 0), (at, peak)], &BLACK);
    chart.draw_series(std::iter::once(vertical(histogram.mean)))?
        .label(format!("Mean: {:.2}", histogram.mean))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    for marker in markers {
        let style = marker.color.stroke_width(2);
        chart.draw_series(std::iter::once(PathElement::new(vec![(marker.at, 0), (marker.at, peak)], style)))?
            .label(format!("{} ({:.0}% at or above)", marker.label, histogram.share_from(marker.at) * 100.0))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    chart.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;

    println!("{}: n={}, range {:.2}..{:.2}, mean {:.2}",
        spec.filename, histogram.len, histogram.min, histogram.max, histogram.mean);
    Ok(())
}
