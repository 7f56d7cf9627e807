/*!
Tables of results from repeated simulation runs

# Working with [`ResultsBuilder`]

Creating a [`ResultsTable`] after running a simulation group:

```
use minesim::prelude::*;

let topology: Topology = "
    small 1 large 2
    large 9 small 2
"
.parse()
.unwrap();

let group = SimulationBuilder::new()
    .topology(topology)
    .block_interval(30.0)
    .height(500)
    .repeat_all(4)
    .build()
    .unwrap();

let results = group
    .run_all()
    .unwrap()
    .average(Average::Mean) // Take the mean of repeated runs' results
    .all()                  // Include every available column
    .format(Format::CSV)    // Output results as CSV
    .build();

println!("{}", results);
```
*/

use std::{collections::BTreeSet, fmt::Display, num::NonZeroUsize};

use crate::{
    miner::MinerId,
    simulation::SimulationOutput,
    stats::Summary,
};

/// Floating point precision of results data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// Builder for [`ResultsTable`]. Produced by running a
/// [`SimulationGroup`](crate::simulation::SimulationGroup).
#[derive(Debug, Clone)]
pub struct ResultsBuilder {
    average: Average,
    columns: BTreeSet<Column>,
    data: Vec<SimulationOutput>,
    format: Format,
    repeated: NonZeroUsize,
}

/// Describes the appearance of a [`ResultsTable`] table as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

impl ResultsBuilder {
    pub(crate) fn new(
        data: Vec<SimulationOutput>,
        repeated: NonZeroUsize,
    ) -> Self {
        Self {
            data,
            repeated,
            average: Average::default(),
            columns: BTreeSet::default(),
            format: Format::default(),
        }
    }

    /// Include the "Revenue", "Stale Rate", "Confirmed Height",
    /// "Stale Blocks", "Max Reorg Depth" and "Average Block Time" columns.
    ///
    /// [`ResultsBuilder::average`] must still be called separately
    /// to create averaged data.
    pub fn all(self) -> Self {
        self.revenue()
            .stale_rate()
            .confirmed_height()
            .stale_blocks()
            .max_reorg_depth()
            .average_block_time()
    }

    /// Average the results of repeated runs based on the given [`Average`]
    /// type. For types other than [`Average::None`], a column describing
    /// the averaging method will be included in the results table.
    pub fn average(mut self, average: Average) -> Self {
        self.average = average;

        self
    }

    /// Extract the raw [`SimulationOutput`] data from this
    /// [`ResultsBuilder`], ordered by seed.
    pub fn data(self) -> Vec<SimulationOutput> {
        self.data
    }

    /// Include a "`name` Revenue" column for each miner: the fraction of the
    /// agreed chain it mined.
    pub fn revenue(mut self) -> Self {
        for miner in 0..self.num_miners() {
            self.columns.insert(Column::MinerRevenue(MinerId(miner)));
        }

        self
    }

    /// Include a "`name` Stale Rate" column for each miner: the fraction of
    /// its blocks which were orphaned.
    pub fn stale_rate(mut self) -> Self {
        for miner in 0..self.num_miners() {
            self.columns.insert(Column::MinerStaleRate(MinerId(miner)));
        }

        self
    }

    /// Include the "Confirmed Height" column.
    pub fn confirmed_height(mut self) -> Self {
        self.columns.insert(Column::ConfirmedHeight);

        self
    }

    /// Include the "Stale Blocks" column.
    pub fn stale_blocks(mut self) -> Self {
        self.columns.insert(Column::StaleBlocks);

        self
    }

    /// Include the "Max Reorg Depth" column.
    pub fn max_reorg_depth(mut self) -> Self {
        self.columns.insert(Column::MaxReorgDepth);

        self
    }

    /// Include the "Average Block Time" column.
    pub fn average_block_time(mut self) -> Self {
        self.columns.insert(Column::AverageBlockTime);

        self
    }

    /// Specify the [`Format`] of the results table.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;

        self
    }

    /// Create new [`ResultsTable`].
    pub fn build(self) -> ResultsTable {
        let ResultsBuilder { average, mut columns, data, format, repeated } =
            self;

        let summaries: Vec<_> = data.iter().map(Summary::new).collect();
        let names: Vec<_> = summaries
            .first()
            .map(|s| s.miners.iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default();

        for miner in 0..names.len() {
            columns.insert(Column::MinerHashrateShare(MinerId(miner)));
        }

        match average {
            Average::None => {
                columns.insert(Column::Seed);
            }
            _ => {
                columns.insert(Column::AverageOf(average));
            }
        }

        let columns = Vec::from_iter(columns);
        let rows = match average {
            Average::None => summaries
                .iter()
                .map(|summary| {
                    columns
                        .iter()
                        .map(|column| column.get_value(summary))
                        .collect()
                })
                .collect(),
            _ => summaries
                .chunks(repeated.get())
                .map(|chunk| {
                    columns
                        .iter()
                        .map(|column| column.get_average_value(average, chunk))
                        .collect()
                })
                .collect(),
        };

        let titles =
            columns.iter().map(|column| column.title(&names)).collect();

        ResultsTable { titles, format, rows }
    }

    fn num_miners(&self) -> usize {
        self.data.first().map(|output| output.miners.len()).unwrap_or(0)
    }
}

/// Formatted results from the completion of a
/// [`SimulationGroup`](crate::simulation::SimulationGroup). The results table
/// is given by the struct's [`Display`] implementation, as specified by
/// its [`Format`].
#[derive(Debug, Clone)]
pub struct ResultsTable {
    titles: Vec<String>,
    format: Format,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultsTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Column titles, in display order.
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.format {
            Format::CSV => {
                write!(f, "{}", self.titles.join(","))?;

                for row in self.rows.iter() {
                    writeln!(f)?;

                    let row: Vec<_> =
                        row.iter().map(|val| val.to_string()).collect();

                    write!(f, "{}", row.join(","))?;
                }
            }
            Format::PrettyPrint => {
                let mut text_widths: Vec<_> =
                    self.titles.iter().map(|title| title.len()).collect();

                for row in self.rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        let val = val.to_string();
                        text_widths[i] = text_widths[i].max(val.len());
                    }
                }

                for (i, title) in self.titles.iter().enumerate() {
                    write!(
                        f,
                        " {:1$} {2}",
                        title,
                        text_widths[i],
                        Self::SEPARATOR_VERTICAL
                    )?;
                }
                writeln!(f)?;

                let total_width: usize =
                    text_widths.iter().map(|x| x + 3).sum();
                for _ in 0..total_width {
                    write!(f, "{}", Self::SEPARATOR_HORIZONTAL)?;
                }

                for row in self.rows.iter() {
                    writeln!(f)?;

                    for (i, val) in row.iter().enumerate() {
                        write!(
                            f,
                            " {:1$} {2}",
                            val.to_string(),
                            text_widths[i],
                            Self::SEPARATOR_VERTICAL
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Methods of extracting an average/central value from a set of repeated
/// runs.
///
/// In the process of creating a results table, the given averaging method is
/// only applied to the values of columns which change between runs.
#[repr(u8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Average {
    #[default]
    /// Include all repeated values.
    None,
    /// Arithmetic mean of all values.
    Mean,
    /// Median of all values.
    Median,
    /// Maximum of all values.
    Max,
    /// Minimum of all values.
    Min,
}

/// Type of column that can appear in a data table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Column {
    // Variant order determines the order of columns in results tables:
    // https://doc.rust-lang.org/stable/std/cmp/trait.PartialOrd.html#derivable
    Seed,
    MinerHashrateShare(MinerId),
    MinerRevenue(MinerId),
    MinerStaleRate(MinerId),
    ConfirmedHeight,
    StaleBlocks,
    MaxReorgDepth,
    AverageBlockTime,
    AverageOf(Average),
}

/// Value which corresponds to a [`Column`].
#[derive(Debug, Clone, PartialEq)]
enum ColumnValue {
    Int(u64),
    Float(f64),
    /// Undefined for this run, e.g. a revenue share on an empty chain.
    Missing,
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => {
                write!(f, "{:.1$}", value, FLOAT_PRECISION_DIGITS)
            }
            Self::Missing => write!(f, "n/a"),
        }
    }
}

impl Column {
    fn title(&self, names: &[String]) -> String {
        let name = |miner: &MinerId| names[miner.0].as_str();

        match self {
            Self::Seed => "Seed".into(),
            Self::MinerHashrateShare(miner) => {
                format!("{} Hashrate Share", name(miner))
            }
            Self::MinerRevenue(miner) => format!("{} Revenue", name(miner)),
            Self::MinerStaleRate(miner) => {
                format!("{} Stale Rate", name(miner))
            }
            Self::ConfirmedHeight => "Confirmed Height".into(),
            Self::StaleBlocks => "Stale Blocks".into(),
            Self::MaxReorgDepth => "Max Reorg Depth".into(),
            Self::AverageBlockTime => "Average Block Time".into(),
            Self::AverageOf(method) => match method {
                Average::Mean => "Mean Of".into(),
                Average::Median => "Median Of".into(),
                Average::Max => "Max Of".into(),
                Average::Min => "Min Of".into(),
                Average::None => unreachable!(),
            },
        }
    }

    /// Numeric value of this column for one run, `None` where undefined.
    fn raw(&self, summary: &Summary) -> Option<f64> {
        let miner = |id: &MinerId| &summary.miners[id.0];

        match self {
            Self::Seed => Some(summary.seed as f64),
            Self::MinerHashrateShare(id) => Some(miner(id).hashrate_share),
            Self::MinerRevenue(id) => miner(id).revenue,
            Self::MinerStaleRate(id) => miner(id).stale_rate,
            Self::ConfirmedHeight => Some(summary.confirmed_height as f64),
            Self::StaleBlocks => Some(summary.stale as f64),
            Self::MaxReorgDepth => Some(summary.max_reorg_depth as f64),
            Self::AverageBlockTime => summary.average_block_time,
            Self::AverageOf(_) => unreachable!(
                "never need the single value of the average descriptor column"
            ),
        }
    }

    fn get_value(&self, summary: &Summary) -> ColumnValue {
        match self {
            Self::Seed => ColumnValue::Int(summary.seed),
            Self::ConfirmedHeight => {
                ColumnValue::Int(summary.confirmed_height)
            }
            Self::StaleBlocks => ColumnValue::Int(summary.stale),
            Self::MaxReorgDepth => ColumnValue::Int(summary.max_reorg_depth),
            _ => match self.raw(summary) {
                Some(value) => ColumnValue::Float(value),
                None => ColumnValue::Missing,
            },
        }
    }

    fn get_average_value(
        &self,
        method: Average,
        data: &[Summary],
    ) -> ColumnValue {
        match self {
            Self::AverageOf(_) => return ColumnValue::Int(data.len() as u64),
            Self::Seed | Self::MinerHashrateShare(_) => {
                return self.get_value(&data[0])
            }
            _ => (),
        }

        let values: Vec<_> =
            data.iter().filter_map(|summary| self.raw(summary)).collect();
        if values.is_empty() {
            return ColumnValue::Missing;
        }

        let avg = match method {
            Average::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Average::Median => crate::utils::median_of_floats(values),
            Average::Max => values.into_iter().fold(f64::MIN, f64::max),
            Average::Min => values.into_iter().fold(f64::MAX, f64::min),
            Average::None => unreachable!(),
        };

        ColumnValue::Float(avg)
    }
}
