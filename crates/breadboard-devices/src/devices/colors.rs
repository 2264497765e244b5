/*!
 * Named colours accepted by RGB pixel strips.
 *
 * Web colour names use underscores (`dark_orange`); colour temperatures are
 * written in kelvin (`2700k`). The table is sorted by name.
 */
use crate::hal::Rgb;

static COLORS: &[(&str, Rgb)] = &[
    ("10000k", Rgb(207, 218, 255)),
    ("1000k", Rgb(255, 56, 0)),
    ("10100k", Rgb(207, 218, 255)),
    ("10200k", Rgb(206, 217, 255)),
    ("10300k", Rgb(205, 217, 255)),
    ("10400k", Rgb(204, 216, 255)),
    ("10500k", Rgb(204, 216, 255)),
    ("10600k", Rgb(203, 215, 255)),
    ("10700k", Rgb(202, 215, 255)),
    ("10800k", Rgb(202, 214, 255)),
    ("10900k", Rgb(201, 214, 255)),
    ("11000k", Rgb(200, 213, 255)),
    ("1100k", Rgb(255, 71, 0)),
    ("11100k", Rgb(200, 213, 255)),
    ("11200k", Rgb(199, 212, 255)),
    ("11300k", Rgb(198, 212, 255)),
    ("11400k", Rgb(198, 212, 255)),
    ("11500k", Rgb(197, 211, 255)),
    ("11600k", Rgb(197, 211, 255)),
    ("11700k", Rgb(197, 210, 255)),
    ("11800k", Rgb(196, 210, 255)),
    ("11900k", Rgb(195, 210, 255)),
    ("12000k", Rgb(195, 209, 255)),
    ("1200k", Rgb(255, 83, 0)),
    ("1300k", Rgb(255, 93, 0)),
    ("1400k", Rgb(255, 101, 0)),
    ("1500k", Rgb(255, 109, 0)),
    ("1600k", Rgb(255, 115, 0)),
    ("1700k", Rgb(255, 121, 0)),
    ("1800k", Rgb(255, 126, 0)),
    ("1900k", Rgb(255, 131, 0)),
    ("2000k", Rgb(255, 138, 18)),
    ("2100k", Rgb(255, 142, 33)),
    ("2200k", Rgb(255, 147, 44)),
    ("2300k", Rgb(255, 152, 54)),
    ("2400k", Rgb(255, 157, 63)),
    ("2500k", Rgb(255, 161, 72)),
    ("2600k", Rgb(255, 165, 79)),
    ("2700k", Rgb(255, 169, 87)),
    ("2800k", Rgb(255, 173, 94)),
    ("2900k", Rgb(255, 177, 101)),
    ("3000k", Rgb(255, 180, 107)),
    ("3100k", Rgb(255, 184, 114)),
    ("3200k", Rgb(255, 187, 120)),
    ("3300k", Rgb(255, 190, 126)),
    ("3400k", Rgb(255, 193, 132)),
    ("3500k", Rgb(255, 196, 137)),
    ("3600k", Rgb(255, 199, 143)),
    ("3700k", Rgb(255, 201, 148)),
    ("3800k", Rgb(255, 204, 153)),
    ("3900k", Rgb(255, 206, 159)),
    ("4000k", Rgb(255, 209, 163)),
    ("4100k", Rgb(255, 211, 168)),
    ("4200k", Rgb(255, 213, 173)),
    ("4300k", Rgb(255, 215, 177)),
    ("4400k", Rgb(255, 217, 182)),
    ("4500k", Rgb(255, 219, 186)),
    ("4600k", Rgb(255, 221, 190)),
    ("4700k", Rgb(255, 223, 194)),
    ("4800k", Rgb(255, 225, 198)),
    ("4900k", Rgb(255, 227, 202)),
    ("5000k", Rgb(255, 228, 206)),
    ("5100k", Rgb(255, 230, 210)),
    ("5200k", Rgb(255, 232, 213)),
    ("5300k", Rgb(255, 233, 217)),
    ("5400k", Rgb(255, 235, 220)),
    ("5500k", Rgb(255, 236, 224)),
    ("5600k", Rgb(255, 238, 227)),
    ("5700k", Rgb(255, 239, 230)),
    ("5800k", Rgb(255, 240, 233)),
    ("5900k", Rgb(255, 242, 236)),
    ("6000k", Rgb(255, 243, 239)),
    ("6100k", Rgb(255, 244, 242)),
    ("6200k", Rgb(255, 245, 245)),
    ("6300k", Rgb(255, 246, 247)),
    ("6400k", Rgb(255, 248, 251)),
    ("6500k", Rgb(255, 249, 253)),
    ("6600k", Rgb(254, 249, 255)),
    ("6700k", Rgb(252, 247, 255)),
    ("6800k", Rgb(249, 246, 255)),
    ("6900k", Rgb(247, 245, 255)),
    ("7000k", Rgb(245, 243, 255)),
    ("7100k", Rgb(243, 242, 255)),
    ("7200k", Rgb(240, 241, 255)),
    ("7300k", Rgb(239, 240, 255)),
    ("7400k", Rgb(237, 239, 255)),
    ("7500k", Rgb(235, 238, 255)),
    ("7600k", Rgb(233, 237, 255)),
    ("7700k", Rgb(231, 236, 255)),
    ("7800k", Rgb(230, 235, 255)),
    ("7900k", Rgb(228, 234, 255)),
    ("8000k", Rgb(227, 233, 255)),
    ("8100k", Rgb(225, 232, 255)),
    ("8200k", Rgb(224, 231, 255)),
    ("8300k", Rgb(222, 230, 255)),
    ("8400k", Rgb(221, 230, 255)),
    ("8500k", Rgb(220, 229, 255)),
    ("8600k", Rgb(218, 229, 255)),
    ("8700k", Rgb(217, 227, 255)),
    ("8800k", Rgb(216, 227, 255)),
    ("8900k", Rgb(215, 226, 255)),
    ("9000k", Rgb(214, 225, 255)),
    ("9100k", Rgb(212, 225, 255)),
    ("9200k", Rgb(211, 224, 255)),
    ("9300k", Rgb(210, 223, 255)),
    ("9400k", Rgb(209, 223, 255)),
    ("9500k", Rgb(208, 222, 255)),
    ("9600k", Rgb(207, 221, 255)),
    ("9700k", Rgb(207, 221, 255)),
    ("9800k", Rgb(206, 220, 255)),
    ("9900k", Rgb(205, 220, 255)),
    ("alice_blue", Rgb(240, 248, 255)),
    ("antique_white", Rgb(250, 235, 215)),
    ("aqua", Rgb(0, 255, 255)),
    ("aqua_marine", Rgb(127, 255, 212)),
    ("azure", Rgb(240, 255, 255)),
    ("beige", Rgb(245, 245, 220)),
    ("bisque", Rgb(255, 228, 196)),
    ("black", Rgb(0, 0, 0)),
    ("blanched_almond", Rgb(255, 235, 205)),
    ("blue", Rgb(0, 0, 255)),
    ("blue_violet", Rgb(138, 43, 226)),
    ("brown", Rgb(165, 42, 42)),
    ("burly_wood", Rgb(222, 184, 135)),
    ("cadet_blue", Rgb(95, 158, 160)),
    ("chartreuse", Rgb(127, 255, 0)),
    ("chocolate", Rgb(210, 105, 30)),
    ("coral", Rgb(255, 127, 80)),
    ("corn_flower_blue", Rgb(100, 149, 237)),
    ("corn_silk", Rgb(255, 248, 220)),
    ("crimson", Rgb(220, 20, 60)),
    ("cyan", Rgb(0, 255, 255)),
    ("dark_blue", Rgb(0, 0, 139)),
    ("dark_cyan", Rgb(0, 139, 139)),
    ("dark_golden_rod", Rgb(184, 134, 11)),
    ("dark_gray", Rgb(169, 169, 169)),
    ("dark_green", Rgb(0, 100, 0)),
    ("dark_khaki", Rgb(189, 183, 107)),
    ("dark_magenta", Rgb(139, 0, 139)),
    ("dark_olive_green", Rgb(85, 107, 47)),
    ("dark_orange", Rgb(255, 140, 0)),
    ("dark_orchid", Rgb(153, 50, 204)),
    ("dark_red", Rgb(139, 0, 0)),
    ("dark_salmon", Rgb(233, 150, 122)),
    ("dark_sea_green", Rgb(143, 188, 143)),
    ("dark_slate_blue", Rgb(72, 61, 139)),
    ("dark_slate_gray", Rgb(47, 79, 79)),
    ("dark_turquoise", Rgb(0, 206, 209)),
    ("dark_violet", Rgb(148, 0, 211)),
    ("deep_pink", Rgb(255, 20, 147)),
    ("deep_sky_blue", Rgb(0, 191, 255)),
    ("dim_gray", Rgb(105, 105, 105)),
    ("dodger_blue", Rgb(30, 144, 255)),
    ("firebrick", Rgb(178, 34, 34)),
    ("floral_white", Rgb(255, 250, 240)),
    ("forest_green", Rgb(34, 139, 34)),
    ("fuchsia", Rgb(255, 0, 255)),
    ("gainsboro", Rgb(220, 220, 220)),
    ("ghost_white", Rgb(248, 248, 255)),
    ("gold", Rgb(255, 215, 0)),
    ("golden_rod", Rgb(218, 165, 32)),
    ("gray", Rgb(128, 128, 128)),
    ("green", Rgb(0, 128, 0)),
    ("green_yellow", Rgb(173, 255, 47)),
    ("honeydew", Rgb(240, 255, 240)),
    ("hot_pink", Rgb(255, 105, 180)),
    ("indian_red", Rgb(205, 92, 92)),
    ("indigo", Rgb(75, 0, 130)),
    ("ivory", Rgb(255, 255, 240)),
    ("khaki", Rgb(240, 230, 140)),
    ("lavender", Rgb(230, 230, 250)),
    ("lavender_blush", Rgb(255, 240, 245)),
    ("lawn_green", Rgb(124, 252, 0)),
    ("lemon_chiffon", Rgb(255, 250, 205)),
    ("light_blue", Rgb(173, 216, 230)),
    ("light_coral", Rgb(240, 128, 128)),
    ("light_cyan", Rgb(224, 255, 255)),
    ("light_golden_rod_yellow", Rgb(250, 250, 210)),
    ("light_gray", Rgb(211, 211, 211)),
    ("light_green", Rgb(144, 238, 144)),
    ("light_pink", Rgb(255, 182, 193)),
    ("light_salmon", Rgb(255, 160, 122)),
    ("light_sea_green", Rgb(32, 178, 170)),
    ("light_sky_blue", Rgb(135, 206, 250)),
    ("light_slate_gray", Rgb(119, 136, 153)),
    ("light_steel_blue", Rgb(176, 196, 222)),
    ("light_yellow", Rgb(255, 255, 224)),
    ("lime", Rgb(0, 255, 0)),
    ("lime_green", Rgb(50, 205, 50)),
    ("linen", Rgb(250, 240, 230)),
    ("magenta", Rgb(255, 0, 255)),
    ("maroon", Rgb(128, 0, 0)),
    ("medium_aqua_marine", Rgb(102, 205, 170)),
    ("medium_blue", Rgb(0, 0, 205)),
    ("medium_orchid", Rgb(186, 85, 211)),
    ("medium_purple", Rgb(147, 112, 219)),
    ("medium_sea_green", Rgb(60, 179, 113)),
    ("medium_slate_blue", Rgb(123, 104, 238)),
    ("medium_spring_green", Rgb(0, 250, 154)),
    ("medium_turquoise", Rgb(72, 209, 204)),
    ("medium_violet_red", Rgb(199, 21, 133)),
    ("midnight_blue", Rgb(25, 25, 112)),
    ("mint_cream", Rgb(245, 255, 250)),
    ("misty_rose", Rgb(255, 228, 225)),
    ("moccasin", Rgb(255, 228, 181)),
    ("navajo_white", Rgb(255, 222, 173)),
    ("navy", Rgb(0, 0, 128)),
    ("old_lace", Rgb(253, 245, 230)),
    ("olive", Rgb(128, 128, 0)),
    ("olive_drab", Rgb(107, 142, 35)),
    ("orange", Rgb(255, 165, 0)),
    ("orange_red", Rgb(255, 69, 0)),
    ("orchid", Rgb(218, 112, 214)),
    ("pale_golden_rod", Rgb(238, 232, 170)),
    ("pale_green", Rgb(152, 251, 152)),
    ("pale_turquoise", Rgb(175, 238, 238)),
    ("pale_violet_red", Rgb(219, 112, 147)),
    ("papaya_whip", Rgb(255, 239, 213)),
    ("peach_puff", Rgb(255, 218, 185)),
    ("peru", Rgb(205, 133, 63)),
    ("pink", Rgb(255, 192, 203)),
    ("plum", Rgb(221, 160, 221)),
    ("powder_blue", Rgb(176, 224, 230)),
    ("purple", Rgb(128, 0, 128)),
    ("red", Rgb(255, 0, 0)),
    ("rosy_brown", Rgb(188, 143, 143)),
    ("royal_blue", Rgb(65, 105, 225)),
    ("saddle_brown", Rgb(139, 69, 19)),
    ("salmon", Rgb(250, 128, 114)),
    ("sandy_brown", Rgb(244, 164, 96)),
    ("sea_green", Rgb(46, 139, 87)),
    ("sea_shell", Rgb(255, 245, 238)),
    ("sienna", Rgb(160, 82, 45)),
    ("silver", Rgb(192, 192, 192)),
    ("sky_blue", Rgb(135, 206, 235)),
    ("slate_blue", Rgb(106, 90, 205)),
    ("slate_gray", Rgb(112, 128, 144)),
    ("snow", Rgb(255, 250, 250)),
    ("spring_green", Rgb(0, 255, 127)),
    ("steel_blue", Rgb(70, 130, 180)),
    ("tan", Rgb(210, 180, 140)),
    ("teal", Rgb(0, 128, 128)),
    ("thistle", Rgb(216, 191, 216)),
    ("tomato", Rgb(255, 99, 71)),
    ("turquoise", Rgb(64, 224, 208)),
    ("violet", Rgb(238, 130, 238)),
    ("wheat", Rgb(245, 222, 179)),
    ("white", Rgb(255, 255, 255)),
    ("white_smoke", Rgb(245, 245, 245)),
    ("yellow", Rgb(255, 255, 0)),
    ("yellow_green", Rgb(154, 205, 50)),
];

/// Look a colour up by name, ignoring case and accepting `grey` for `gray`
pub fn lookup(name: &str) -> Option<Rgb> {
    let normalized = name.trim().to_ascii_lowercase().replace("grey", "gray");
    COLORS
        .binary_search_by(|(candidate, _)| (*candidate).cmp(normalized.as_str()))
        .ok()
        .map(|i| COLORS[i].1)
}

/// Every known colour name, sorted
pub fn names() -> impl Iterator<Item = &'static str> {
    COLORS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted_for_lookup() {
        let names: Vec<&str> = names().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("red"), Some(Rgb(255, 0, 0)));
        assert_eq!(lookup("Dark_Grey"), Some(Rgb(169, 169, 169)));
        assert_eq!(lookup("2700k"), Some(Rgb(255, 169, 87)));
        assert_eq!(lookup("plaid"), None);
    }
}
