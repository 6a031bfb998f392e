pub mod scene_overlay_surface;
