use std::path::PathBuf;

use itertools::Itertools;
use psf_calc::{
    calc_datacube, calc_psf, Blackbody, CalcParams, Instrument, InstrumentOptions, Normalization,
    Preset, PsfProduct, Rounding, Source, Trace,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "psf-calc", about = "Space telescope PSF calculation")]
struct Opt {
    /// Instrument preset: imager or coronagraph
    #[structopt(short, long, default_value = "imager")]
    instrument: Preset,
    /// Detector (default: the instrument default detector)
    #[structopt(short, long)]
    detector: Option<String>,
    /// Aperture name, e.g. IMG1_SUB160
    #[structopt(short, long)]
    aperture: Option<String>,
    /// Detector pixel x coordinate
    #[structopt(long)]
    detector_x: Option<f64>,
    /// Detector pixel y coordinate
    #[structopt(long)]
    detector_y: Option<f64>,
    /// Filter name, e.g. F200W
    #[structopt(short, long)]
    filter: Option<String>,
    /// Coronagraph occulting mask
    #[structopt(long)]
    image_mask: Option<String>,
    /// Pupil plane mask
    #[structopt(long)]
    pupil_mask: Option<String>,
    /// Instrument options as key=value, e.g. -O source_offset_r=0.3
    #[structopt(short = "O", long = "option")]
    options: Vec<String>,
    /// Aperture table CSV file
    #[structopt(long)]
    apertures: Option<PathBuf>,
    /// Directory of filter profiles CSV files
    #[structopt(long)]
    filters: Option<PathBuf>,
    /// Oversampling factor
    #[structopt(long)]
    oversample: Option<usize>,
    /// Occulter plane oversampling factor
    #[structopt(long)]
    fft_oversample: Option<usize>,
    /// Final image oversampling factor
    #[structopt(long)]
    detector_oversample: Option<usize>,
    /// Field of view [arcsec]
    #[structopt(long)]
    fov_arcsec: Option<f64>,
    /// Field of view [px]
    #[structopt(long)]
    fov_pixels: Option<usize>,
    /// Monochromatic wavelength [micron]
    #[structopt(short, long)]
    monochromatic: Option<f64>,
    /// Number of wavelengths
    #[structopt(short, long)]
    nlambda: Option<usize>,
    /// Black body source temperature [K]
    #[structopt(long)]
    blackbody: Option<f64>,
    /// Normalization: entrance_pupil, exit_pupil or last
    #[structopt(long, default_value = "entrance_pupil")]
    normalize: Normalization,
    /// Field of view rounding: half_even or half_up
    #[structopt(long, default_value = "half_even")]
    rounding: Rounding,
    /// One normalized slice per wavelength instead of a polychromatic sum
    #[structopt(long)]
    datacube: bool,
    /// Output file
    #[structopt(short, long, default_value = "psf.npz")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut instrument = Instrument::preset(opt.instrument)?;
    if let Some(path) = &opt.apertures {
        instrument = instrument.apertures_csv(path)?;
    }
    if let Some(path) = &opt.filters {
        instrument = instrument.filters_dir(path)?;
    }

    let options = opt
        .options
        .iter()
        .try_fold(InstrumentOptions::default(), |options, assignment| {
            options.assign(assignment)
        })?;
    let mut builder = instrument.configure().options(options).rounding(opt.rounding);
    if let Some(detector) = &opt.detector {
        builder = builder.detector(detector);
    }
    if let Some(aperture) = &opt.aperture {
        builder = builder.aperture(aperture);
    }
    match (opt.detector_x, opt.detector_y) {
        (Some(x), Some(y)) => builder = builder.detector_position(x, y),
        (None, None) => (),
        _ => anyhow::bail!("both --detector-x and --detector-y are required"),
    }
    if let Some(filter) = &opt.filter {
        builder = builder.filter(filter);
    }
    if let Some(mask) = &opt.image_mask {
        builder = builder.image_mask(mask);
    }
    if let Some(mask) = &opt.pupil_mask {
        builder = builder.pupil_mask(mask);
    }
    let config = builder.build()?;

    let mut params = CalcParams::new().normalize(opt.normalize);
    if let Some(value) = opt.oversample {
        params = params.oversample(value);
    }
    if let Some(value) = opt.fft_oversample {
        params = params.fft_oversample(value);
    }
    if let Some(value) = opt.detector_oversample {
        params = params.detector_oversample(value);
    }
    if let Some(value) = opt.fov_arcsec {
        params = params.fov_arcsec(value);
    }
    if let Some(value) = opt.fov_pixels {
        params = params.fov_pixels(value);
    }
    if let Some(value) = opt.nlambda {
        params = params.nlambda(value);
    }
    if let Some(temperature) = opt.blackbody {
        params = params.source(Source::spectrum(Blackbody::new(temperature)));
    }

    let trace = Trace::new(instrument.name());
    let psf: PsfProduct = if opt.datacube {
        let wavelengths = opt.monochromatic.map(|l| vec![l * 1e-6]);
        calc_datacube(
            &config,
            &params,
            wavelengths,
            &instrument.collaborators(),
            &trace,
            None,
        )?
    } else {
        if let Some(wavelength) = opt.monochromatic {
            params = params.monochromatic(wavelength * 1e-6);
        }
        calc_psf(&config, &params, &instrument.collaborators(), &trace)?
    };

    for plane in psf.planes() {
        let (lo, hi) = plane
            .image()
            .iter()
            .cloned()
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()
            .unwrap_or_default();
        println!(
            "{:>8}: {:?} @ {:.4}arcsec/px, total {:.6}, range [{:.3e}, {:.3e}]",
            plane.kind,
            plane.shape(),
            plane.header.pixelscale,
            plane.totals().iter().sum::<f64>(),
            lo,
            hi
        );
    }
    psf.save(&opt.output)?;

    Ok(())
}
