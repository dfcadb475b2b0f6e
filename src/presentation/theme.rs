use eframe::egui;

pub struct Palette {
    pub bg: egui::Color32,
    pub fg: egui::Color32,
    pub stroke: egui::Color32,
    pub leaf: egui::Color32,
    pub sun: egui::Color32,
    pub water: egui::Color32,
    pub alert: egui::Color32,
}

impl Palette {
    pub fn new(is_dark: bool) -> Self {
        if is_dark {
            Self {
                bg: egui::Color32::from_rgb(22, 26, 22),
                fg: egui::Color32::from_rgb(230, 236, 228),
                stroke: egui::Color32::from_rgb(200, 210, 196),
                leaf: egui::Color32::from_rgb(90, 200, 110),
                sun: egui::Color32::from_rgb(250, 200, 60),
                water: egui::Color32::from_rgb(70, 170, 230),
                alert: egui::Color32::from_rgb(240, 90, 80),
            }
        } else {
            Self {
                bg: egui::Color32::from_rgb(244, 247, 240),
                fg: egui::Color32::from_rgb(24, 32, 24),
                stroke: egui::Color32::from_rgb(40, 60, 40),
                leaf: egui::Color32::from_rgb(40, 160, 70),
                sun: egui::Color32::from_rgb(240, 180, 20),
                water: egui::Color32::from_rgb(30, 130, 200),
                alert: egui::Color32::from_rgb(210, 50, 40),
            }
        }
    }
}

pub fn configure_theme(ctx: &egui::Context, is_dark: bool) {
    let mut style = (*ctx.style()).clone();
    let palette = Palette::new(is_dark);

    style
        .text_styles
        .iter_mut()
        .for_each(|(text_style, font_id)| {
            font_id.size = match text_style {
                egui::TextStyle::Heading => 26.0,
                egui::TextStyle::Body => 15.0,
                egui::TextStyle::Button => 15.0,
                _ => font_id.size,
            };
        });

    style.spacing.item_spacing = egui::vec2(10.0, 10.0);
    style.spacing.button_padding = egui::vec2(14.0, 8.0);
    style.spacing.slider_width = 260.0;

    let rounding = egui::Rounding::same(6.0);
    let widgets = &mut style.visuals.widgets;
    widgets.noninteractive.bg_stroke = egui::Stroke::new(1.5, palette.stroke);
    widgets.noninteractive.rounding = rounding;
    widgets.noninteractive.fg_stroke = egui::Stroke::new(1.0, palette.fg);
    widgets.noninteractive.bg_fill = palette.bg;

    widgets.inactive.bg_stroke = egui::Stroke::new(1.5, palette.stroke);
    widgets.inactive.rounding = rounding;
    widgets.inactive.fg_stroke = egui::Stroke::new(1.0, palette.fg);

    widgets.hovered.bg_stroke = egui::Stroke::new(2.0, palette.leaf);
    widgets.hovered.rounding = rounding;
    widgets.hovered.bg_fill = palette.sun;
    widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);

    widgets.active.bg_stroke = egui::Stroke::new(2.0, palette.stroke);
    widgets.active.rounding = rounding;
    widgets.active.bg_fill = palette.leaf;
    widgets.active.fg_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);

    style.visuals.selection.stroke = egui::Stroke::new(1.0, palette.stroke);
    style.visuals.selection.bg_fill = palette.water;

    style.visuals.window_rounding = rounding;
    style.visuals.window_stroke = egui::Stroke::new(1.5, palette.stroke);
    style.visuals.window_fill = palette.bg;
    style.visuals.panel_fill = palette.bg;
    style.visuals.override_text_color = Some(palette.fg);
    style.visuals.error_fg_color = palette.alert;

    ctx.set_style(style);
}
