use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use doc_model::{DisplayOptions, Rotation, ScreenPoint, ViewMode, ViewState, MAX_SCALE, MIN_SCALE, SCALE_STEP};
use image::Rgba;
use marginalia_core::{
    leave_group_feedback, student_summaries, Aggregator, DrawOp, HighlightStore, OverlayRenderer,
    RenderDelivery, ViewerConfig, ViewerSession,
};
use marginalia_render::{DocumentRenderer, LopdfRenderer, ResourceRegistry, RgbaImage};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{FixtureSet, Storage};
use viewer_core::PageLayoutController;

#[derive(Debug, Parser)]
#[command(name = "marginalia")]
#[command(about = "Review student highlights and annotations on a document")]
pub struct Cli {
    /// Viewer config file. Without it, stored display preferences apply with
    /// MARGINALIA_* environment variables on top.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory holding stored display preferences. Defaults to the
    /// platform data directory.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page to PNG with highlight fills composited on top.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, value_name = "JSON")]
        fixtures: Option<PathBuf>,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print review groups, one page or the whole lesson.
    Groups {
        #[arg(long, value_name = "JSON")]
        fixtures: PathBuf,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Print per-student highlight and annotation counts.
    Students {
        #[arg(long, value_name = "JSON")]
        fixtures: PathBuf,
    },
    /// Print the overlay draw list for a page.
    Draw {
        #[arg(long, value_name = "JSON")]
        fixtures: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        no_names: bool,
        #[arg(long)]
        no_counts: bool,
    },
    /// Report which highlight sits under a screen point.
    Hit {
        #[arg(long, value_name = "JSON")]
        fixtures: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Replay navigation steps and print the resulting view.
    Layout {
        #[arg(long, default_value_t = 1)]
        pages: u32,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        #[arg(long)]
        go_to: Option<u32>,
        #[arg(value_enum)]
        steps: Vec<NavStep>,
    },
    /// Leave the same teacher feedback on every annotation of a group.
    Feedback {
        #[arg(long, value_name = "JSON")]
        fixtures: PathBuf,
        #[arg(long)]
        page: u32,
        /// Group key: the first 20 characters of the highlighted text.
        #[arg(long)]
        group: String,
        #[arg(long)]
        text: String,
        /// Where to write the updated fixtures. Defaults to overwriting the input.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show stored display preferences, updating any that are given.
    Prefs {
        #[arg(long, value_enum)]
        view_mode: Option<ModeArg>,
        #[arg(long)]
        student_names: Option<bool>,
        #[arg(long)]
        highlight_count: Option<bool>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, Args)]
struct ViewArgs {
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
    #[arg(long, default_value_t = 0)]
    rotation: u16,
}

impl ViewArgs {
    fn view_state(self) -> Result<ViewState> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&self.scale) {
            anyhow::bail!("--scale must be between {MIN_SCALE} and {MAX_SCALE}");
        }
        let steps = (self.scale - MIN_SCALE) / SCALE_STEP;
        if (steps - steps.round()).abs() > 1e-9 {
            anyhow::bail!("--scale must be a multiple of {SCALE_STEP}");
        }
        let rotation = Rotation::try_from(self.rotation)?;
        Ok(ViewState { scale: self.scale, rotation, ..ViewState::default() })
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Single,
    Double,
}

impl From<ModeArg> for ViewMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => ViewMode::Single,
            ModeArg::Double => ViewMode::Double,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NavStep {
    Next,
    Prev,
    ZoomIn,
    ZoomOut,
    Rotate,
    Single,
    Double,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f64,
    height: f64,
}

#[derive(Debug, Serialize)]
struct GroupOutput {
    page: u32,
    key: String,
    preview: String,
    highlight_ids: Vec<String>,
    student_count: usize,
    annotation_count: usize,
}

#[derive(Debug, Serialize)]
struct StudentOutput {
    student_id: String,
    student_name: String,
    highlight_count: usize,
    annotation_count: usize,
}

#[derive(Debug, Serialize)]
struct HitOutput {
    page: u32,
    highlight_id: Option<String>,
    text: Option<String>,
    student_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct PrefsOutput {
    view_mode: ViewMode,
    show_student_names: bool,
    show_highlight_count: bool,
}

#[derive(Debug, Serialize)]
struct LayoutOutput {
    current_page: u32,
    visible_pages: Vec<u32>,
    scale: f64,
    rotation: u16,
    page_label: String,
    zoom_label: String,
    can_go_next: bool,
    can_go_prev: bool,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let data_dir = cli.data_dir.as_deref();
    let config = load_config(cli.config.as_deref(), data_dir)?;

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render { file, page, fixtures, view, output } => {
            run_render(&config, &file, page, fixtures.as_deref(), view, output.as_deref())
        }
        Commands::Groups { fixtures, page } => run_groups(&fixtures, page),
        Commands::Students { fixtures } => run_students(&fixtures),
        Commands::Draw { fixtures, page, view, no_names, no_counts } => {
            let mut options = config.display_options();
            options.show_student_names &= !no_names;
            options.show_highlight_count &= !no_counts;
            run_draw(&config, &fixtures, page, view, &options)
        }
        Commands::Hit { fixtures, page, x, y, view } => run_hit(&fixtures, page, ScreenPoint::new(x, y), view),
        Commands::Layout { pages, mode, go_to, steps } => {
            let mode = mode.map(ViewMode::from).unwrap_or(config.view_mode);
            run_layout(pages, mode, go_to, &steps)
        }
        Commands::Feedback { fixtures, page, group, text, output } => {
            run_feedback(&fixtures, page, &group, &text, output.as_deref())
        }
        Commands::Prefs { view_mode, student_names, highlight_count } => {
            run_prefs(data_dir, view_mode.map(ViewMode::from), student_names, highlight_count)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// A config file wins outright. Otherwise stored display preferences apply,
/// with `MARGINALIA_*` variables on top.
fn load_config(path: Option<&Path>, data_dir: Option<&Path>) -> Result<ViewerConfig> {
    if let Some(path) = path {
        return ViewerConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()));
    }

    let base = match open_storage(data_dir) {
        Ok(storage) => {
            let display = storage.load_display_options().with_context(|| {
                format!("failed to read display preferences in {}", storage.root().display())
            })?;
            ViewerConfig::default().with_display_options(&display)
        }
        Err(error) => {
            tracing::warn!(error = %error, "no preference store, using default display options");
            ViewerConfig::default()
        }
    };
    base.apply_env().context("invalid MARGINALIA_* environment")
}

fn open_storage(data_dir: Option<&Path>) -> Result<Storage> {
    match data_dir {
        Some(dir) => Ok(Storage::with_root(dir)),
        None => Storage::from_default_project().context("unable to resolve local data directory"),
    }
}

fn load_store(path: &Path) -> Result<(FixtureSet, HighlightStore)> {
    ensure_file_exists(path)?;
    let fixtures = FixtureSet::load(path)
        .with_context(|| format!("failed to read fixtures {}", path.display()))?;
    let store = HighlightStore::with_fixtures(fixtures.highlights.clone(), fixtures.annotations.clone())
        .context("invalid fixtures")?;
    Ok((fixtures, store))
}

fn print_json<T: Serialize>(payload: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(payload)?;
    println!("{json}");
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn run_info(file: &Path) -> Result<()> {
    ensure_file_exists(file)?;
    let bytes = fs::read(file)?;

    runtime()?.block_on(async {
        let registry = ResourceRegistry::new();
        let renderer = LopdfRenderer::new(registry.clone());
        let url = registry.create(bytes);
        let doc = renderer.load_document(url.as_str()).await.context("failed to open PDF")?;
        registry.revoke(&url);

        let payload = InfoOutput {
            path: file.display().to_string(),
            page_count: doc.page_count,
            first_page_size_pt: doc
                .page_size(1)
                .map(|size| PageSizeOutput { width: size.width, height: size.height }),
        };
        renderer.close(doc.handle).await;
        print_json(&payload)
    })
}

fn run_render(
    config: &ViewerConfig,
    file: &Path,
    page: u32,
    fixtures: Option<&Path>,
    view: ViewArgs,
    output: Option<&Path>,
) -> Result<()> {
    ensure_file_exists(file)?;
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    let target = view.view_state()?;
    let store = match fixtures {
        Some(path) => load_store(path)?.1,
        None => HighlightStore::new(),
    };
    let bytes = fs::read(file)?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));
    let config = config.clone().with_view_mode(ViewMode::Single);

    runtime()?.block_on(async {
        let registry = ResourceRegistry::new();
        let renderer = Arc::new(LopdfRenderer::new(registry.clone()));
        let mut session = ViewerSession::new(renderer, registry, config).with_store(store);
        session.load_bytes(bytes).await.context("failed to open PDF")?;

        let page_count = session.layout().total_pages();
        if page > page_count {
            anyhow::bail!("page {page} out of range (page_count={page_count})");
        }
        apply_view(session.layout_mut(), page, &target);

        let delivery = session.render_visible().await?.into_iter().next();
        match delivery {
            Some(RenderDelivery::Ready { page: mut rendered, overlay }) => {
                composite(&mut rendered.bitmap, &overlay);
                if let Some(parent) = output.parent() {
                    fs::create_dir_all(parent)?;
                }
                rendered
                    .bitmap
                    .save(&output)
                    .with_context(|| format!("failed to write image to {}", output.display()))?;
                println!("{}", output.display());
                Ok(())
            }
            Some(RenderDelivery::Failed { error, .. }) => {
                Err(anyhow::Error::new(error).context(format!("failed to render page {page}")))
            }
            Some(RenderDelivery::Stale { .. }) | None => anyhow::bail!("page {page} was not rendered"),
        }
    })
}

/// Drives the layout controller to `page` at the requested zoom and rotation.
fn apply_view(layout: &mut PageLayoutController, page: u32, target: &ViewState) {
    layout.go_to_page(page);
    while layout.state().scale + SCALE_STEP / 2.0 <= target.scale {
        layout.zoom_in();
    }
    while layout.state().scale - SCALE_STEP / 2.0 >= target.scale {
        layout.zoom_out();
    }
    while layout.state().rotation != target.rotation {
        layout.rotate();
    }
}

/// Alpha-blends highlight fills onto the page. Labels need a font
/// rasterizer and are left to the front end.
fn composite(bitmap: &mut RgbaImage, overlay: &[DrawOp]) {
    let (width, height) = bitmap.dimensions();

    for op in overlay {
        let DrawOp::Rect { rect, color, opacity, .. } = op else { continue };
        let x0 = rect.x.max(0.0).floor() as u32;
        let y0 = rect.y.max(0.0).floor() as u32;
        let x1 = ((rect.x + rect.width).max(0.0).ceil() as u32).min(width);
        let y1 = ((rect.y + rect.height).max(0.0).ceil() as u32).min(height);
        let alpha = opacity.clamp(0.0, 1.0);

        for y in y0..y1 {
            for x in x0..x1 {
                let Rgba([r, g, b, a]) = *bitmap.get_pixel(x, y);
                let blend = |base: u8, over: u8| {
                    (f32::from(base) * (1.0 - alpha) + f32::from(over) * alpha).round() as u8
                };
                bitmap.put_pixel(x, y, Rgba([blend(r, color.r), blend(g, color.g), blend(b, color.b), a]));
            }
        }
    }
}

fn run_groups(fixtures: &Path, page: Option<u32>) -> Result<()> {
    let (_, store) = load_store(fixtures)?;
    let aggregator = Aggregator::new(&store);

    let pages: Vec<u32> = match page {
        Some(page) => vec![page],
        None => (1..=store.all().iter().map(|h| h.page_number).max().unwrap_or(0)).collect(),
    };

    let payload: Vec<GroupOutput> = pages
        .into_iter()
        .flat_map(|page| aggregator.group_by_page(page))
        .map(|group| GroupOutput {
            page: group.page,
            preview: group.preview(),
            highlight_ids: group.members.iter().map(|h| h.id.to_string()).collect(),
            student_count: group.student_count(),
            annotation_count: group.annotation_count(),
            key: group.key,
        })
        .collect();

    print_json(&payload)
}

fn run_students(fixtures: &Path) -> Result<()> {
    let (_, store) = load_store(fixtures)?;

    let payload: Vec<StudentOutput> = student_summaries(&store)
        .into_iter()
        .map(|summary| StudentOutput {
            student_id: summary.student_id.to_string(),
            highlight_count: summary.highlight_count(),
            annotation_count: summary.annotation_count(),
            student_name: summary.student_name,
        })
        .collect();

    print_json(&payload)
}

fn run_draw(
    config: &ViewerConfig,
    fixtures: &Path,
    page: u32,
    view: ViewArgs,
    options: &DisplayOptions,
) -> Result<()> {
    let (_, store) = load_store(fixtures)?;
    let view = view.view_state()?;

    let ops = OverlayRenderer::new(&store)
        .with_label_font_px(config.label_font_px)
        .draw_list(page, &view, options);
    print_json(&ops)
}

fn run_hit(fixtures: &Path, page: u32, point: ScreenPoint, view: ViewArgs) -> Result<()> {
    let (_, store) = load_store(fixtures)?;
    let view = view.view_state()?;

    let hit = OverlayRenderer::new(&store).hit_test(point, page, &view);
    print_json(&HitOutput {
        page,
        highlight_id: hit.map(|h| h.id.to_string()),
        text: hit.map(|h| h.text.clone()),
        student_name: hit.map(|h| h.student_name.clone()),
    })
}

fn run_layout(pages: u32, mode: ViewMode, go_to: Option<u32>, steps: &[NavStep]) -> Result<()> {
    let mut layout = PageLayoutController::with_view_mode(pages, mode);
    if let Some(page) = go_to {
        layout.go_to_page(page);
    }

    for step in steps {
        match step {
            NavStep::Next => layout.next_page(),
            NavStep::Prev => layout.prev_page(),
            NavStep::ZoomIn => layout.zoom_in(),
            NavStep::ZoomOut => layout.zoom_out(),
            NavStep::Rotate => layout.rotate(),
            NavStep::Single => layout.set_view_mode(ViewMode::Single),
            NavStep::Double => layout.set_view_mode(ViewMode::Double),
        }
    }

    let state = layout.state();
    print_json(&LayoutOutput {
        current_page: state.current_page,
        visible_pages: layout.visible_pages(),
        scale: state.scale,
        rotation: state.rotation.degrees(),
        page_label: layout.page_label(),
        zoom_label: layout.zoom_label(),
        can_go_next: layout.can_go_next(),
        can_go_prev: layout.can_go_prev(),
    })
}

fn run_feedback(fixtures: &Path, page: u32, group: &str, text: &str, output: Option<&Path>) -> Result<()> {
    let (mut fixture_set, mut store) = load_store(fixtures)?;
    let updated = leave_group_feedback(&mut store, page, group, text)?;
    if updated == 0 {
        anyhow::bail!("no annotations in group {group:?} on page {page}");
    }

    fixture_set.annotations = store.all_annotations().into_iter().cloned().collect();
    let output = output.unwrap_or(fixtures);
    fixture_set
        .save(output)
        .with_context(|| format!("failed to write fixtures to {}", output.display()))?;

    tracing::info!(updated, output = %output.display(), "feedback saved");
    println!("{updated}");
    Ok(())
}

fn run_prefs(
    data_dir: Option<&Path>,
    view_mode: Option<ViewMode>,
    student_names: Option<bool>,
    highlight_count: Option<bool>,
) -> Result<()> {
    let storage = open_storage(data_dir)?;
    let mut display = storage.load_display_options()?;
    let before = display;

    if let Some(mode) = view_mode {
        display.view_mode = mode;
    }
    if let Some(show) = student_names {
        display.show_student_names = show;
    }
    if let Some(show) = highlight_count {
        display.show_highlight_count = show;
    }

    if display != before {
        storage.save_display_options(&display)?;
        tracing::info!(root = %storage.root().display(), "display preferences saved");
    }

    print_json(&PrefsOutput {
        view_mode: display.view_mode,
        show_student_names: display.show_student_names,
        show_highlight_count: display.show_highlight_count,
    })
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Color, HighlightId, ScreenRect};

    #[test]
    fn apply_view_snaps_to_controller_steps() {
        let mut layout = PageLayoutController::with_view_mode(5, ViewMode::Single);
        let target = ViewState { scale: 1.75, rotation: Rotation::Deg270, ..ViewState::default() };

        apply_view(&mut layout, 4, &target);

        assert_eq!(layout.current_page(), 4);
        assert_eq!(layout.state().scale, 1.75);
        assert_eq!(layout.state().rotation, Rotation::Deg270);

        apply_view(&mut layout, 4, &ViewState { scale: 0.5, ..ViewState::default() });
        assert_eq!(layout.state().scale, 0.5);
        assert_eq!(layout.state().rotation, Rotation::Deg0);
    }

    #[test]
    fn composite_blends_only_inside_rect() {
        let mut bitmap = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let ops = vec![DrawOp::Rect {
            highlight_id: HighlightId::new("1"),
            rect: ScreenRect::new(2.0, 2.0, 3.0, 3.0),
            color: Color::rgb(0, 0, 0),
            opacity: 0.5,
        }];

        composite(&mut bitmap, &ops);

        assert_eq!(*bitmap.get_pixel(3, 3), Rgba([128, 128, 128, 255]));
        assert_eq!(*bitmap.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*bitmap.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn view_args_reject_bad_rotation_and_scale() {
        assert!(ViewArgs { scale: 1.0, rotation: 45 }.view_state().is_err());
        assert!(ViewArgs { scale: 4.0, rotation: 0 }.view_state().is_err());
        assert!(ViewArgs { scale: 1.5, rotation: 180 }.view_state().is_ok());
        assert!(ViewArgs { scale: 0.75, rotation: 0 }.view_state().is_ok());
        assert!(ViewArgs { scale: 1.1, rotation: 0 }.view_state().is_err());
        assert!(ViewArgs { scale: 2.9, rotation: 0 }.view_state().is_err());
    }
}
