//! Example: print the page object tree of every page
//!
//! Usage: cargo run --example dump_page_objects -- <pdf-file> [page]
//!
//! Set `RUST_LOG=pdfio=debug` to see recovery and decode diagnostics.

use pdfio::{PDDoc, PageObject};
use std::error::Error;
use tracing_subscriber::EnvFilter;

fn print_objects(objects: &[PageObject], depth: usize) {
    let indent = "  ".repeat(depth);
    for object in objects {
        match object {
            PageObject::Element(e) => println!("{indent}{} ({} operands)", e.operator, e.operands.len()),
            PageObject::TextRun(run) => {
                println!("{indent}text {:?} font {:?}", run.text, run.state.font)
            }
            PageObject::InlineImage(image) => println!(
                "{indent}inline image {:?}x{:?}, {} bytes",
                image.width(),
                image.height(),
                image.data.len()
            ),
            PageObject::TextObject(group)
            | PageObject::MarkedContent(group)
            | PageObject::SavedState(group) => {
                let end = group.end.as_ref().map_or("<implicit>", |e| e.operator.as_str());
                println!("{indent}{} ... {end}", group.begin.operator);
                print_objects(&group.children, depth + 1);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <pdf-file> [page]", args[0]);
        std::process::exit(1);
    }

    let doc = PDDoc::open(&args[1])?;
    println!("PDF {} with {} pages", doc.version(), doc.page_count()?);

    let info = doc.get_info()?;
    if let Some(title) = info.title() {
        println!("Title: {title}");
    }
    if let Some(created) = info.creation_date() {
        println!("Created: {}", created.as_datetime());
    }

    let pages = match args.get(2) {
        Some(selector) => match selector.parse::<u32>() {
            Ok(number) => doc.get_page_range(number..=number)?,
            Err(_) => doc.get_page_range(selector.as_str())?,
        },
        None => doc.get_page_range(1..=doc.page_count()?)?,
    };

    for page in pages {
        let label = doc.get_page_label(page.number())?;
        let media_box = page.media_box();
        println!(
            "\n== Page {} (label {label}) {}x{} rotated {}",
            page.number(),
            media_box.width(),
            media_box.height(),
            page.rotation()
        );
        if page.is_empty() {
            println!("(empty)");
            continue;
        }
        print_objects(&page.get_content_objects()?, 1);
    }

    Ok(())
}
