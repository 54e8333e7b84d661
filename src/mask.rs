use crate::dataset::{AttrValue, Dataset, NO_DATA};
use crate::error::{AppError, Result};

/// Include/exclude grid aligned to a dataset's `x`/`y` coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    x: Vec<f64>,
    y: Vec<f64>,
    include: Vec<bool>,
}

impl Mask {
    /// `include` is row-major with `y.len()` rows of `x.len()` cells.
    pub fn new(x: Vec<f64>, y: Vec<f64>, include: Vec<bool>) -> Result<Self> {
        if include.len() != x.len() * y.len() {
            return Err(AppError::ShapeMismatch(format!(
                "mask has {} cells but coordinates describe {}x{}",
                include.len(),
                y.len(),
                x.len()
            )));
        }
        Ok(Self { x, y, include })
    }

    /// Build a mask from the first 2-D slice of `variable`.
    ///
    /// Cells equal to zero, NaN, no-data or the variable's fill value are excluded.
    pub fn from_dataset(dataset: &Dataset, variable: &str) -> Result<Self> {
        let var = dataset
            .variable(variable)
            .ok_or_else(|| AppError::MissingVariable {
                file: "mask".to_string(),
                variables: vec![variable.to_string()],
            })?;

        let (x, y) = coordinates(dataset).ok_or_else(|| {
            AppError::ShapeMismatch("mask file has no x/y coordinate variables".to_string())
        })?;

        if !var.is_grid() {
            return Err(AppError::ShapeMismatch(format!(
                "mask variable '{}' is not a (y, x) grid",
                variable
            )));
        }

        let fill = var.fill_value();
        let cells = x.len() * y.len();
        let include = var
            .values
            .iter()
            .take(cells)
            .map(|v| !(v.is_nan() || *v == 0.0 || *v == NO_DATA || Some(*v) == fill))
            .collect();

        Self::new(x, y, include)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.y.len(), self.x.len())
    }

    pub fn included_cells(&self) -> usize {
        self.include.iter().filter(|c| **c).count()
    }
}

fn coordinates(dataset: &Dataset) -> Option<(Vec<f64>, Vec<f64>)> {
    let x = dataset.variable("x")?.values.clone();
    let y = dataset.variable("y")?.values.clone();
    Some((x, y))
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

fn same_bounds(a: &[f64], b: &[f64]) -> bool {
    match (a.first(), a.last(), b.first(), b.last()) {
        (Some(a0), Some(a1), Some(b0), Some(b1)) => approx_eq(*a0, *b0) && approx_eq(*a1, *b1),
        _ => a.is_empty() && b.is_empty(),
    }
}

/// Return a copy of `dataset` with every excluded cell of every grid variable
/// set to [`NO_DATA`]. The input is not modified.
pub fn apply(dataset: &Dataset, mask: &Mask) -> Result<Dataset> {
    let (ny, nx) = dataset.grid_shape().ok_or_else(|| {
        AppError::ShapeMismatch("dataset has no y/x dimensions".to_string())
    })?;

    if (ny, nx) != mask.shape() {
        return Err(AppError::ShapeMismatch(format!(
            "dataset grid is {}x{} but mask is {}x{}",
            ny,
            nx,
            mask.shape().0,
            mask.shape().1
        )));
    }

    let (x, y) = coordinates(dataset).ok_or_else(|| {
        AppError::ShapeMismatch("dataset has no x/y coordinate variables".to_string())
    })?;

    if !same_bounds(&x, &mask.x) || !same_bounds(&y, &mask.y) {
        return Err(AppError::ShapeMismatch(format!(
            "coordinate bounds differ: dataset x [{:?}, {:?}] y [{:?}, {:?}], mask x [{:?}, {:?}] y [{:?}, {:?}]",
            x.first(),
            x.last(),
            y.first(),
            y.last(),
            mask.x.first(),
            mask.x.last(),
            mask.y.first(),
            mask.y.last()
        )));
    }

    let cells = ny * nx;
    if cells == 0 {
        return Err(AppError::ShapeMismatch(format!(
            "dataset grid {}x{} has no cells",
            ny, nx
        )));
    }
    let mut masked = dataset.clone();

    for (name, var) in masked.variables.iter_mut() {
        if !var.is_grid() {
            continue;
        }

        let n = var.shape.len();
        if n < 2 || var.shape[n - 2..] != [ny, nx] || var.values.len() % cells != 0 {
            return Err(AppError::ShapeMismatch(format!(
                "variable '{}' has shape {:?}, expected trailing {}x{}",
                name, var.shape, ny, nx
            )));
        }

        for slice in var.values.chunks_mut(cells) {
            for (value, keep) in slice.iter_mut().zip(&mask.include) {
                if !keep {
                    *value = NO_DATA;
                }
            }
        }

        var.attrs
            .insert("_FillValue".to_string(), AttrValue::Number(NO_DATA));
    }

    Ok(masked)
}
