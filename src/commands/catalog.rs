use super::AppContext;
use crate::apk_list::{filter_apks, ApkListView};
use crate::models::{Apk, Categoria};

fn print_apks(apks: &[Apk]) {
    if apks.is_empty() {
        println!("No APKs found");
        return;
    }
    for apk in apks {
        let category = if apk.categoria_id.is_empty() {
            "-"
        } else {
            &apk.categoria_id
        };
        println!("{:<24} {:<16} {}", apk.id, category, apk);
    }
}

pub async fn list_categories(ctx: &AppContext) -> Result<(), String> {
    let stream = ctx.service.categorias().await.map_err(|e| e.to_string())?;
    let categorias: Vec<Categoria> = stream.current();
    stream.release();

    if categorias.is_empty() {
        println!("No categories");
    }
    for c in categorias {
        println!(
            "{:<24} {:<20} {}",
            c.id,
            c.nombre.as_deref().unwrap_or("-"),
            c.descripcion.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn list_apks(ctx: &AppContext, category: Option<String>) -> Result<(), String> {
    let stream = ctx.service.apks().await.map_err(|e| e.to_string())?;
    let apks = stream.current();
    stream.release();

    print_apks(&filter_apks(&apks, category.as_deref().unwrap_or("")));
    Ok(())
}

pub async fn watch_apks(ctx: &AppContext, category: Option<String>) -> Result<(), String> {
    let mut view = ApkListView::activate(&ctx.service)
        .await
        .map_err(|e| e.to_string())?;
    if let Some(category) = category {
        view.select_category(category);
    }
    print_apks(&view.filtered());
    log::info!(
        "Watching APKs every {}s (Ctrl-C to stop)",
        ctx.config.poll_interval_secs
    );

    let result = loop {
        tokio::select! {
            changed = view.filtered_changed() => match changed {
                Ok(apks) => {
                    println!("--- {} APK(s) ---", apks.len());
                    print_apks(&apks);
                }
                Err(e) => break Err(e.to_string()),
            },
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    view.deactivate();
    result
}

pub async fn add_category(
    ctx: &AppContext,
    nombre: String,
    descripcion: Option<String>,
) -> Result<(), String> {
    let categoria = Categoria {
        nombre: Some(nombre),
        descripcion,
        ..Default::default()
    };
    let id = ctx
        .service
        .create_categoria(categoria)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", id);
    Ok(())
}

pub async fn delete_apk(ctx: &AppContext, id: &str) -> Result<(), String> {
    ctx.service
        .delete_apk(id)
        .await
        .map_err(|e| e.to_string())?;
    log::info!("Deleted APK {}", id);
    Ok(())
}
