//! Built-in names of the images and sounds sketches can load.

use once_cell::sync::Lazy;

#[derive(Debug)]
pub struct AssetGroup {
    pub name: &'static str,
    pub assets: Vec<&'static str>,
}

#[derive(Debug)]
pub struct Catalog {
    pub images: Vec<AssetGroup>,
    pub sounds: Vec<AssetGroup>,
}

impl Catalog {
    pub fn has_image(&self, group: &str, image: &str) -> bool {
        find(&self.images, group, image)
    }

    pub fn has_sound(&self, group: &str, sound: &str) -> bool {
        find(&self.sounds, group, sound)
    }
}

fn find(groups: &[AssetGroup], group: &str, name: &str) -> bool {
    groups
        .iter()
        .any(|g| g.name == group && g.assets.contains(&name))
}

fn group(name: &'static str, assets: &'static str) -> AssetGroup {
    AssetGroup {
        name,
        assets: assets.split_whitespace().collect(),
    }
}

pub static CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog {
    images: vec![
        group(
            "animals",
            "birds_rainbow-lorakeets boxer-getting-tan boxer-laying-down boxer-wagging-tongue
            butterfly butterfly_monarch cat cheetah collies crocodiles dog_sleeping-puppy
            dogs_collies fox horse kangaroos komodo-dragon penguins rabbit retriever shark
            sleeping-puppy snake_green-tree-boa spider",
        ),
        group(
            "avatars",
            "Hopper-jumping.gif Thumbs.db aqualine-sapling aqualine-seed aqualine-seedling
            aqualine-tree aqualine-ultimate avatar-team cs-hopper-cool cs-hopper-happy
            cs-hopper-jumping cs-ohnoes cs-winston-baby cs-winston duskpin-sapling duskpin-seed
            duskpin-seedling duskpin-tree duskpin-ultimate leaf-blue leaf-green leaf-grey
            leaf-orange leaf-red leaf-yellow leafers-sapling leafers-seed leafers-seedling
            leafers-tree leafers-ultimate marcimus-orange marcimus-purple marcimus-red marcimus
            mr-pants-green mr-pants-idle.gif mr-pants-orange mr-pants-pink mr-pants-purple
            mr-pants-with-hat mr-pants mr-pink-green mr-pink-orange mr-pink mystery-1 mystery-2
            old-spice-man-blue old-spice-man orange-juice-squid piceratops-sapling piceratops-seed
            piceratops-seedling piceratops-tree piceratops-ultimate primosaur-sapling
            primosaur-seed primosaur-seedling primosaur-tree primosaur-ultimate purple-pi-pink
            purple-pi-teal purple-pi questionmark robot_female_1 robot_female_2 robot_female_3
            robot_male_1 robot_male_2 robot_male_3 spunky-sam-green spunky-sam-orange
            spunky-sam-red spunky-sam starky-sapling starky-seed starky-seedling starky-tree
            starky-ultimate",
        ),
        group(
            "creatures",
            "BabyWinston Hopper-Cool Hopper-Happy Hopper-Jumping OhNoes-Happy OhNoes-Hmm OhNoes
            Winston",
        ),
        group(
            "cute",
            "Blank BrownBlock CharacterBoy CharacterCatGirl CharacterHornGirl CharacterPinkGirl
            CharacterPrincessGirl ChestClosed ChestLid ChestOpen DirtBlock DoorTallClosed
            DoorTallOpen EnemyBug GemBlue GemGreen GemOrange GrassBlock Heart Key None PlainBlock
            RampEast RampNorth RampSouth RampWest Rock RoofEast RoofNorth RoofNorthEast
            RoofNorthWest RoofSouth RoofSouthEast RoofSouthWest RoofWest Selector ShadowEast
            ShadowNorth ShadowNorthEast ShadowNorthWest ShadowSideWest ShadowSouth ShadowSouthEast
            ShadowSouthWest ShadowWest Star StoneBlock StoneBlockTall TreeShort TreeTall TreeUgly
            WallBlock WallBlockTall WaterBlock WindowTall WoodBlock",
        ),
        group(
            "food",
            "bananas berries broccoli brussels-sprouts cake chocolates coffee-beans croissant
            dumplings fish_grilled-snapper fruits grapes hamburger ice-cream mushroom oysters pasta
            potato-chips potatoes shish-kebab strawberries sushi tomatoes",
        ),
        group(
            "landscapes",
            "beach-at-dusk beach-in-hawaii beach-sunset beach-waves-at-sunset beach-waves-at-sunset2
            beach-waves-daytime beach-with-palm-trees beach clouds-from-plane crop-circle
            fields-of-grain fields-of-wine lake-steam-rising lake lava lotus-garden
            mountain_matterhorn mountains-and-lake mountains-in-hawaii mountains-sunset sand-dunes
            waterfall_niagara-falls",
        ),
        group(
            "misc",
            "boxmodel tim-berners-lee-webpage tim-berners-lee",
        ),
        group(
            "seasonal",
            "disco-ball father-winston fireworks-2015 fireworks-in-sky fireworks-over-harbor
            fireworks-scattered gingerbread-family gingerbread-house gingerbread-houses
            gingerbread-man hannukah-dreidel hannukah-menorah hopper-elfer hopper-partying
            hopper-reindeer house-with-lights penguin-with-presents red-nosed-winston
            reindeer-with-hat reindeer santa-with-bag snow-crystal1 snow-crystal2 snow-crystal3
            snowman snownoes snowy-slope-with-trees stocking-empty xmas-cookies xmas-ornament-boat
            xmas-ornament-on-tree xmas-ornaments xmas-presents xmas-scene-holly-border
            xmas-tree-with-presents xmas-tree xmas-wreath",
        ),
        group(
            "space",
            "0 1 2 3 4 5 6 7 8 9 background beetleship collisioncircle girl1 girl2 girl3 girl4 girl5
            healthheart minus octopus planet plus rocketship star",
        ),
    ],
    sounds: vec![
        group(
            "rpg",
            "battle-magic battle-spell battle-swing coin-jingle door-open giant-hyah giant-no
            giant-yah hit-clop hit-splat hit-thud hit-whack metal-chime metal-clink step-heavy
            water-bubble water-slosh",
        ),
        group(
            "retro",
            "boom1 boom2 coin hit1 hit2 jump1 jump2 laser1 laser2 laser3 laser4 rumble
            thruster-short thruster-long whistle1 whistle2",
        ),
    ],
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookups() {
        assert!(CATALOG.has_image("cute", "Blank"));
        assert!(CATALOG.has_image("space", "rocketship"));
        assert!(!CATALOG.has_image("cute", "rocketship"));
        assert!(CATALOG.has_sound("retro", "coin"));
        assert!(!CATALOG.has_sound("rpg", "coin"));
    }
}
