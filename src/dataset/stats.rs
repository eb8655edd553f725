//! Dataset statistics for the `stats` subcommand

use std::collections::BTreeMap;

use burn::data::dataset::Dataset;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::burn_dataset::PlumeDataset;
use crate::utils::error::Result;
use crate::utils::format_number;

/// Summary of a plume dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub by_difficulty: BTreeMap<String, usize>,
    /// Distinct spatial shapes and how many samples have each
    pub shapes: BTreeMap<String, usize>,
    pub plume_pixels: u64,
    pub total_pixels: u64,
    /// Samples whose label mask has no plume pixel at all
    pub empty_masks: usize,
}

impl DatasetStats {
    /// Walk every sample of the dataset; any unreadable sample aborts
    pub fn collect(dataset: &PlumeDataset) -> Result<Self> {
        let mut stats = Self {
            by_difficulty: dataset.index().difficulty_counts(),
            ..Self::default()
        };

        for i in 0..dataset.len() {
            let item = dataset.load(i)?;
            let positives = item.label.iter().filter(|&&v| v != 0).count() as u64;

            stats.total_samples += 1;
            stats.plume_pixels += positives;
            stats.total_pixels += item.label.len() as u64;
            if positives == 0 {
                stats.empty_masks += 1;
            }
            *stats
                .shapes
                .entry(format!("{}x{}", item.height, item.width))
                .or_insert(0) += 1;
        }

        Ok(stats)
    }

    /// Fraction of labelled pixels that belong to a plume
    pub fn plume_ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.plume_pixels as f64 / self.total_pixels as f64
        }
    }

    pub fn print(&self) {
        println!("{}", "Dataset Statistics".cyan().bold());
        println!("  Samples:         {}", format_number(self.total_samples));
        for (difficulty, count) in &self.by_difficulty {
            println!("    {:<14} {}", format!("{}:", difficulty), format_number(*count));
        }
        for (shape, count) in &self.shapes {
            println!("  Shape {:<10} {}", shape, format_number(*count));
        }
        println!("  Empty masks:     {}", format_number(self.empty_masks));
        println!("  Plume pixels:    {:.4}%", self.plume_ratio() * 100.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::PlumeItem;

    #[test]
    fn test_collect_from_items() {
        let a = PlumeItem::from_parts("a", vec![0.0; 4], vec![1, 0, 0, 1], 1, 2, 2).unwrap();
        let b = PlumeItem::from_parts("b", vec![0.0; 4], vec![0, 0, 0, 0], 1, 2, 2).unwrap();
        let stats = DatasetStats::collect(&PlumeDataset::from_items(vec![a, b])).unwrap();

        assert_eq!(stats.total_samples, 2);
        assert_eq!(stats.plume_pixels, 2);
        assert_eq!(stats.total_pixels, 8);
        assert_eq!(stats.empty_masks, 1);
        assert_eq!(stats.shapes.get("2x2"), Some(&2));
        assert!((stats.plume_ratio() - 0.25).abs() < 1e-12);
    }
}
