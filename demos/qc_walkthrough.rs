//! Walkthrough of control QC and inoculum filtering on an in-memory dataset.
//!
//! This example shows how to:
//! 1. Build a control reference and a count table
//! 2. Correlate controls with their expected concentration
//! 3. Summarise passing mice per day
//! 4. Filter barcodes on the inoculum and look up a gene

use tnseq_qc::prelude::*;

fn main() -> Result<()> {
    println!("=== Tn-seq QC Example ===\n");

    let (counts, controls) = create_example_data();

    println!("Data dimensions:");
    println!("  Rows:     {}", counts.len());
    println!("  Barcodes: {}", counts.barcodes().len());
    println!("  Samples:  {}", counts.sample_ids().len());
    println!("  Controls: {}", controls.len());
    println!();

    println!("=== Control Correlation ===\n");

    let report = compute_correlations(&counts, &controls, &CorrelationConfig::default())?;
    print!("{}", report);
    println!();

    let summary = summarize_samples_by_day(&counts, &report.good);
    for day in &summary {
        println!(
            "Day {}: {} passing ({}), failed: {}",
            day.day,
            day.n_passing(),
            day.passing.join(", "),
            day.failed.join(", ")
        );
    }
    println!();

    println!("=== Inoculum Filter ===\n");

    match filter_all_experiments(&counts, 500)? {
        Outcome::Data(filtered) => {
            for exp in &filtered.experiments {
                if let Some(stats) = &exp.stats {
                    println!("{} / {}", exp.dnaid, exp.experiment);
                    print!("{}", stats);
                }
            }
            println!();
            match barcodes_for_gene(&filtered, "thrA") {
                Outcome::Data(rows) => {
                    println!("thrA barcodes after filtering:");
                    for r in rows {
                        println!("  {:<6} {:<14} {:>6}", r.barcode, r.sample_id, r.count);
                    }
                }
                Outcome::NoData(reason) => println!("{}", reason),
            }
        }
        Outcome::NoData(reason) => println!("No data: {}", reason),
    }

    Ok(())
}

/// Three samples: an inoculum, a mouse with a mild bottleneck and one with a
/// severe bottleneck.
fn create_example_data() -> (CountTable, ControlTable) {
    let controls = ControlTable::from_records(
        [("wt1", 1.0), ("wt2", 10.0), ("wt3", 100.0), ("wt4", 1000.0)]
            .into_iter()
            .map(|(bc, conc)| ControlBarcode {
                barcode: bc.to_string(),
                phenotype: "wt".to_string(),
                expected_concentration: conc,
            })
            .collect(),
    );

    let samples = [
        ("inoculum_1", None, "d0", [12, 110, 1050, 9800], [2400, 800, 90]),
        ("m1_d2", Some("m1"), "d2", [8, 95, 1300, 7600], [1900, 0, 12]),
        ("m2_d2", Some("m2"), "d2", [0, 3000, 15, 2], [40, 5, 0]),
    ];
    let genes = [("ins1", "thrA", "STM0002"), ("ins2", "thrA", "STM0002"), ("ins3", "thrB", "STM0003")];

    let mut records = Vec::new();
    for (sample_id, mouse, day, control_counts, gene_counts) in samples {
        let base = |barcode: &str, count: u64| CountRecord {
            barcode: barcode.to_string(),
            sample_id: sample_id.to_string(),
            count,
            dnaid: "dnaid2023".to_string(),
            experiment: "TV5490A".to_string(),
            mouse: mouse.map(String::from),
            day: Some(day.to_string()),
            organ: Some("liver".to_string()),
            short_name: None,
            locus_tag: None,
            role: RoleInference::default().infer(sample_id),
        };
        for (i, count) in control_counts.into_iter().enumerate() {
            records.push(base(&format!("wt{}", i + 1), count));
        }
        for ((barcode, name, locus), count) in genes.iter().zip(gene_counts) {
            records.push(CountRecord {
                short_name: Some(name.to_string()),
                locus_tag: Some(locus.to_string()),
                ..base(barcode, count)
            });
        }
    }

    (CountTable::new(records), controls)
}
