//! Adaptive PDF tiling (§4.2): a pure, fully testable policy deciding
//! whether a rendered page needs splitting into overlapping tiles before
//! OCR, and if so, what those tiles are. The actual rendering at
//! `pdf_dpi_large_page` and the OCR call itself are out of scope — this
//! module only computes the layout.

use kiwi_core::config::LoaderConfig;

use crate::decoder::RenderedPage;

/// One rectangular region of a page to render/OCR independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Either the page is processed whole, or split into the listed tiles
/// (already capped to `pdf_tile_cap_per_page`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TilePlan {
    Whole,
    Tiles(Vec<Tile>),
}

/// Decides the tile layout for one page.
///
/// A page is tiled when its pixel area exceeds `pdf_large_page_px`. Tiles
/// have a max edge of `pdf_tile_max_edge_px` and overlap adjacent tiles by
/// `pdf_tile_overlap_px` on each shared edge, in reading order (row-major,
/// top-left first), capped at `pdf_tile_cap_per_page` tiles.
pub fn plan_tiles(page: &RenderedPage, config: &LoaderConfig) -> TilePlan {
    if page.area_px() <= config.pdf_large_page_px as u64 {
        return TilePlan::Whole;
    }

    let tile_edge = config.pdf_tile_max_edge_px.max(1);
    let overlap = config.pdf_tile_overlap_px.min(tile_edge.saturating_sub(1));
    let stride = tile_edge - overlap;

    let mut tiles = Vec::new();
    let mut y = 0u32;
    'rows: loop {
        let height = tile_edge.min(page.height_px.saturating_sub(y));
        if height == 0 {
            break;
        }
        let mut x = 0u32;
        loop {
            let width = tile_edge.min(page.width_px.saturating_sub(x));
            if width == 0 {
                break;
            }
            tiles.push(Tile { x, y, width, height });
            if tiles.len() >= config.pdf_tile_cap_per_page {
                break 'rows;
            }
            if x + width >= page.width_px {
                break;
            }
            x += stride;
        }
        if y + height >= page.height_px {
            break;
        }
        y += stride;
    }

    if tiles.len() <= 1 {
        TilePlan::Whole
    } else {
        TilePlan::Tiles(tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LoaderConfig {
        LoaderConfig {
            max_tokens_per_unit: 500,
            pdf_large_page_px: 1_000_000,
            pdf_dpi_large_page: 300,
            pdf_tile_max_edge_px: 600,
            pdf_tile_overlap_px: 50,
            pdf_tile_cap_per_page: 12,
            pdf_panel_detection: false,
        }
    }

    #[test]
    fn small_page_is_not_tiled() {
        let page = RenderedPage { page_index: 0, width_px: 800, height_px: 1000, bytes: vec![] };
        assert_eq!(plan_tiles(&page, &config()), TilePlan::Whole);
    }

    #[test]
    fn large_page_splits_into_overlapping_tiles() {
        let page = RenderedPage { page_index: 0, width_px: 1800, height_px: 1200, bytes: vec![] };
        match plan_tiles(&page, &config()) {
            TilePlan::Tiles(tiles) => {
                assert!(tiles.len() > 1);
                // adjacent tiles in the first row overlap by the configured amount
                let first = tiles[0];
                let second = tiles[1];
                assert_eq!(second.x, first.x + (600 - 50));
                assert!(second.x < first.x + first.width);
            }
            TilePlan::Whole => panic!("expected tiling"),
        }
    }

    #[test]
    fn tile_count_is_capped() {
        let mut cfg = config();
        cfg.pdf_tile_cap_per_page = 2;
        let page = RenderedPage { page_index: 0, width_px: 4000, height_px: 4000, bytes: vec![] };
        match plan_tiles(&page, &cfg) {
            TilePlan::Tiles(tiles) => assert_eq!(tiles.len(), 2),
            TilePlan::Whole => panic!("expected tiling"),
        }
    }

    #[test]
    fn tiles_cover_the_full_page() {
        let page = RenderedPage { page_index: 0, width_px: 1700, height_px: 1300, bytes: vec![] };
        if let TilePlan::Tiles(tiles) = plan_tiles(&page, &config()) {
            let max_x = tiles.iter().map(|t| t.x + t.width).max().unwrap();
            let max_y = tiles.iter().map(|t| t.y + t.height).max().unwrap();
            assert_eq!(max_x, page.width_px);
            assert_eq!(max_y, page.height_px);
        } else {
            panic!("expected tiling");
        }
    }
}
