use std::{path::PathBuf, rc::Rc, sync::{Arc, atomic::Ordering}};

use anyhow::{Result, anyhow};
use clap::Parser as ClapParser;
use awidget::{accesslog::AccessLog,
              api_server::{run_server, ApiServer, PageSite},
              config::Config,
              fixtures::Fixtures,
              io_util::{my_read_to_string, my_write_string},
              model_store::ModelStore,
              page::render_page,
              registry::WidgetRegistry,
              transport::{fetch_pool, HttpTransport},
              warn::DO_INFO};


#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Serve the model API at /api/, and with --pages, the pages in
    /// that directory with their widgets rendered.
    Serve {
        /// The model store, a JSON file mapping model names to lists
        /// of objects
        #[clap(long)]
        models: PathBuf,

        #[clap(long)]
        pages: Option<PathBuf>,

        /// Listen address, overriding AWIDGET_LISTEN
        #[clap(long)]
        listen: Option<String>,
    },
    /// Render a page with its widgets, fetching from a running
    /// model API.
    Render {
        page: PathBuf,

        /// Base URL of the model API, overriding AWIDGET_API_URL
        #[clap(long)]
        api_url: Option<String>,

        /// Where to write the result; stdout if not given
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Parser, Debug)]
/// Declarative widgets: fetch their models and templates from a model
/// API, and render them into HTML pages.
struct Args {
    /// Print progress information (also via AWIDGET_VERBOSE)
    #[clap(short, long)]
    verbose: bool,

    /// The fixtures file describing the widgets
    #[clap(long, default_value = "demo/fixtures.json")]
    fixtures: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;
    if args.verbose || config.verbose {
        DO_INFO.store(true, Ordering::SeqCst);
    }
    let fixtures = Fixtures::load(&args.fixtures)?;

    match args.command {
        Command::Serve { models, pages, listen } => {
            let listen = listen.unwrap_or(config.listen);
            let pages = pages.map(|pages_dir| PageSite {
                pages_dir,
                fixtures: Arc::new(fixtures),
                api_base: config.api_url.clone()
                    .unwrap_or_else(|| format!("http://{listen}")),
                fetch_timeout: config.fetch_timeout,
                pool: fetch_pool(config.workers),
            });
            let server = Arc::new(ApiServer {
                store: Arc::new(ModelStore::load(&models)?),
                log: Arc::new(AccessLog::open(config.logdir.as_deref())?),
                pages,
            });
            let (addr, handle, _stop) = run_server(&listen, server)?;
            eprintln!("serving on http://{addr}/");
            handle.join().map_err(|_| anyhow!("server thread panicked"))
        }
        Command::Render { page, api_url, output } => {
            let api_url = api_url.or(config.api_url).ok_or_else(
                || anyhow!("need --api-url option or AWIDGET_API_URL env var"))?;
            let transport = Rc::new(HttpTransport::with_workers(
                &api_url, config.fetch_timeout, config.workers)?);
            let registry = WidgetRegistry::from_fixtures(transport.clone(), &fixtures)?;
            let html = render_page(&my_read_to_string(&page)?,
                                   &registry,
                                   &fixtures.settings.dom_attach_point,
                                   || transport.drain())?;
            match output {
                Some(path) => my_write_string(path, &html),
                None => {
                    print!("{html}");
                    Ok(())
                }
            }
        }
    }
}
