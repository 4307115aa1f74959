//! PSF datacube
//!
//! Monochromatic PSFs over a linear wavelength range, each slice normalized
//! independently

use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use psf_calc::{
    calc_datacube, CalcParams, Instrument, InstrumentOptions, Normalization, PlaneKind, Preset,
    Trace,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "psf-datacube", about = "Wavelength datacube of PSFs")]
struct Opt {
    /// Instrument preset: imager or coronagraph
    #[structopt(short, long, default_value = "imager")]
    instrument: Preset,
    /// Aperture name
    #[structopt(short, long)]
    aperture: Option<String>,
    /// Filter name, sets the default wavelength range
    #[structopt(short, long)]
    filter: Option<String>,
    /// Coronagraph occulting mask
    #[structopt(long)]
    image_mask: Option<String>,
    /// Instrument options as key=value
    #[structopt(short = "O", long = "option")]
    options: Vec<String>,
    /// Shortest wavelength [micron]
    #[structopt(long)]
    from: Option<f64>,
    /// Longest wavelength [micron]
    #[structopt(long)]
    to: Option<f64>,
    /// Number of wavelengths
    #[structopt(short, long)]
    nlambda: Option<usize>,
    /// Field of view [arcsec]
    #[structopt(long)]
    fov_arcsec: Option<f64>,
    /// Oversampling factor
    #[structopt(long)]
    oversample: Option<usize>,
    /// Normalization: entrance_pupil, exit_pupil or last
    #[structopt(long, default_value = "last")]
    normalize: Normalization,
    /// Output file
    #[structopt(short, long, default_value = "psf_datacube.npz")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let instrument = Instrument::preset(opt.instrument)?;
    let options = opt
        .options
        .iter()
        .try_fold(InstrumentOptions::default(), |options, assignment| {
            options.assign(assignment)
        })?;
    let mut builder = instrument.configure().options(options);
    if let Some(aperture) = &opt.aperture {
        builder = builder.aperture(aperture);
    }
    if let Some(filter) = &opt.filter {
        builder = builder.filter(filter);
    }
    if let Some(mask) = &opt.image_mask {
        builder = builder.image_mask(mask);
    }
    let config = builder.build()?;

    let mut params = CalcParams::new().normalize(opt.normalize);
    if let Some(value) = opt.nlambda {
        params = params.nlambda(value);
    }
    if let Some(value) = opt.fov_arcsec {
        params = params.fov_arcsec(value);
    }
    if let Some(value) = opt.oversample {
        params = params.oversample(value);
    }

    let wavelengths = match (opt.from, opt.to) {
        (Some(from), Some(to)) => {
            let n = opt.nlambda.unwrap_or(10);
            anyhow::ensure!(n > 0, "nlambda must be at least 1");
            Some(
                (0..n)
                    .map(|i| {
                        let t = if n > 1 {
                            i as f64 / (n - 1) as f64
                        } else {
                            0.5
                        };
                        (from + (to - from) * t) * 1e-6
                    })
                    .collect::<Vec<f64>>(),
            )
        }
        (None, None) => None,
        _ => anyhow::bail!("both --from and --to are required"),
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )?
        .progress_chars("#>-"),
    );
    let cube = calc_datacube(
        &config,
        &params,
        wavelengths,
        &instrument.collaborators(),
        &Trace::new("datacube"),
        Some(pb.clone()),
    )?;
    pb.finish_with_message("done");

    if let Some(plane) = cube
        .plane(PlaneKind::Oversampled)
        .or_else(|| cube.planes().first())
    {
        for (i, wavelength) in &plane.header.slice_wavelengths {
            println!(
                "#{i:03} {:.4}micron: total {:.6}",
                wavelength * 1e6,
                plane.slices[*i].sum()
            );
        }
    }
    cube.save(&opt.output)?;

    Ok(())
}
