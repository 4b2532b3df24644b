pub mod panel_gui;
