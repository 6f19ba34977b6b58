/*!
# Saving chain output to CSV

Enable via the `csv` feature.
*/

use ndarray::{Array3, Axis};
use std::error::Error;
use std::fs::File;

use csv::Writer;

use crate::output::ChainOutput;

/**
Saves per-unit draws as a CSV file.

The data is expected to be in a shape of **draw × unit × coordinate**. The file has a header row
`"draw"`, `"unit"`, `"w1"`, `"w2"` and one row per draw and unit.

# Examples

```rust
use eco_mcmc::io::csv::save_unit_csv;
use ndarray::arr3;

// 2 draws of 1 unit.
let data = arr3(&[[[0.25, 0.5]], [[0.3, 0.45]]]);

save_unit_csv(&data, "/tmp/w.csv").expect("Expecting saving data to succeed");
```
*/
pub fn save_unit_csv<T: std::fmt::Display>(
    data: &Array3<T>,
    filename: &str,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    wtr.write_record(["draw", "unit", "w1", "w2"])?;

    for (draw_idx, draw) in data.axis_iter(Axis(0)).enumerate() {
        for (unit_idx, unit) in draw.axis_iter(Axis(0)).enumerate() {
            let mut row = vec![draw_idx.to_string(), unit_idx.to_string()];
            row.extend(unit.iter().map(|v| v.to_string()));
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/**
Saves the population parameters of every retained draw.

Columns: `"draw"`, `"mu0"`, `"mu1"`, `"sigma00"`, `"sigma01"`, `"sigma11"`. Fails if the chain
did not store its parameters.
*/
pub fn save_parameters_csv(output: &ChainOutput, filename: &str) -> Result<(), Box<dyn Error>> {
    let (Some(mu), Some(sigma)) = (&output.mu, &output.sigma) else {
        return Err("the chain did not store mu and Sigma".into());
    };
    let mut wtr = Writer::from_writer(File::create(filename)?);
    wtr.write_record(["draw", "mu0", "mu1", "sigma00", "sigma01", "sigma11"])?;

    for k in 0..output.n_draws() {
        let mut row = vec![k.to_string()];
        row.extend(mu.row(k).iter().map(|v| v.to_string()));
        row.extend(sigma.row(k).iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
